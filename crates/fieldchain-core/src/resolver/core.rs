//! The node resolver
//!
//! Copyright (c) 2025 Fieldchain Team
//! Licensed under the Apache-2.0 license

use super::cache::NodeCache;
use super::registry::{Fallback, FallbackResolver, NodeFactory, RawCallable, ServiceLocator};
use crate::args::cache_key;
use crate::declaration::{Declaration, Identity};
use crate::error::{Error, Result};
use crate::node::{from_fn, instrument, Callable, Leaf, Transform};
use crate::record::{method_name_for, MethodArity, MethodCall, Record};
use std::sync::Arc;

/// Outcome of the strategy chain, before a leaf is built
pub enum Resolution {
    /// A cached node instance (ready-made, factory-built or from the fallback)
    Instance {
        key: String,
        instance: Arc<dyn Transform>,
        class: String,
    },
    /// A method on the owning record
    Method {
        key: String,
        method: String,
        arity: MethodArity,
        class: String,
    },
    /// A raw invocable from the fallback resolver
    Raw {
        key: String,
        callable: RawCallable,
        class: String,
    },
    Unresolved,
}

impl Resolution {
    /// Entry key in the node cache, if resolved
    pub fn cache_key(&self) -> Option<&str> {
        match self {
            Resolution::Instance { key, .. }
            | Resolution::Method { key, .. }
            | Resolution::Raw { key, .. } => Some(key),
            Resolution::Unresolved => None,
        }
    }
}

/// Resolves leaf declarations into cached leaves
pub struct NodeResolver {
    cache: Arc<NodeCache>,
    factory: Option<Arc<dyn NodeFactory>>,
    services: Option<Arc<dyn ServiceLocator>>,
    fallback: Option<Arc<dyn FallbackResolver>>,
}

impl NodeResolver {
    pub fn new(cache: Arc<NodeCache>) -> Self {
        Self {
            cache,
            factory: None,
            services: None,
            fallback: None,
        }
    }

    pub fn with_factory(mut self, factory: Arc<dyn NodeFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn with_services(mut self, services: Arc<dyn ServiceLocator>) -> Self {
        self.services = Some(services);
        self
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackResolver>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn cache(&self) -> &Arc<NodeCache> {
        &self.cache
    }

    /// Resolve a leaf declaration for `owner`
    pub fn resolve(&self, declaration: &Declaration, owner: &dyn Record) -> Result<Leaf> {
        let resolution = self.locate(declaration, owner)?;
        self.build_leaf(resolution, declaration, owner)
    }

    /// Run the strategy chain; instances found along the way are cached and booted
    pub fn locate(&self, declaration: &Declaration, owner: &dyn Record) -> Result<Resolution> {
        let name = match &declaration.identity {
            Identity::Instance(instance) => {
                let key = format!(
                    "instance:{}@{:x}",
                    instance.name(),
                    Arc::as_ptr(instance) as *const () as usize
                );
                let instance = self.cache.store_instance(&key, instance.clone());
                self.boot(&instance, owner)?;
                return Ok(Resolution::Instance {
                    key,
                    class: instance.name().to_string(),
                    instance,
                });
            }
            Identity::Modifier(modifier) => {
                return Err(Error::configuration(format!(
                    "modifier `{}` cannot be resolved as a leaf node",
                    modifier.name()
                )));
            }
            Identity::Named(name) => name,
        };

        if let Some(resolution) = self.locate_type(name, declaration, owner)? {
            return Ok(resolution);
        }
        if let Some(resolution) = self.locate_method(name, owner) {
            return Ok(resolution);
        }
        if let Some(resolution) = self.locate_fallback(name, declaration, owner)? {
            return Ok(resolution);
        }
        Ok(Resolution::Unresolved)
    }

    fn locate_type(
        &self,
        name: &str,
        declaration: &Declaration,
        owner: &dyn Record,
    ) -> Result<Option<Resolution>> {
        let Some(factory) = &self.factory else {
            return Ok(None);
        };
        let Some(info) = factory.describe(name) else {
            return Ok(None);
        };
        if !info.implements_transform {
            return Err(Error::configuration(format!(
                "type `{}` does not implement the transform capability",
                name
            )));
        }

        let key = format!("type:{}|{}", name, constructor_key(declaration));
        let instance = match self.cache.instance(&key) {
            Some(instance) => {
                log::trace!("node cache hit for `{}`", key);
                instance
            }
            None => {
                let args = declaration.constructor_args.as_deref();
                if args.is_none() && info.requires_arguments {
                    return Err(Error::configuration(format!(
                        "node type `{}` requires constructor arguments but none were declared",
                        name
                    )));
                }
                let mut node = factory.instantiate(name, args)?;
                self.populate_dependencies(name, node.as_mut())?;
                self.cache.record_instantiation();
                log::debug!("instantiated node type `{}` as `{}`", name, key);
                if let Some(args) = args {
                    self.cache.retain_args(&key, args);
                }
                self.cache.store_instance(&key, Arc::from(node))
            }
        };
        self.boot(&instance, owner)?;

        Ok(Some(Resolution::Instance {
            key,
            instance,
            class: name.to_string(),
        }))
    }

    fn locate_method(&self, name: &str, owner: &dyn Record) -> Option<Resolution> {
        let method = method_name_for(name);
        let arity = owner.method_arity(&method)?;
        Some(Resolution::Method {
            key: format!("method:{}::{}", owner.record_type(), method),
            method,
            arity,
            class: owner.record_type().to_string(),
        })
    }

    fn locate_fallback(
        &self,
        name: &str,
        declaration: &Declaration,
        owner: &dyn Record,
    ) -> Result<Option<Resolution>> {
        let Some(fallback) = &self.fallback else {
            return Ok(None);
        };
        let key = format!("fallback:{}|{}", name, constructor_key(declaration));
        match fallback.resolve(name, declaration, owner) {
            None => Ok(None),
            Some(Fallback::Node(instance)) => {
                if let Some(args) = &declaration.constructor_args {
                    self.cache.retain_args(&key, args);
                }
                let instance = self.cache.store_instance(&key, instance);
                self.boot(&instance, owner)?;
                Ok(Some(Resolution::Instance {
                    key,
                    instance,
                    class: name.to_string(),
                }))
            }
            Some(Fallback::Callable(callable)) => Ok(Some(Resolution::Raw {
                key,
                callable,
                class: name.to_string(),
            })),
        }
    }

    fn populate_dependencies(&self, type_name: &str, node: &mut dyn Transform) -> Result<()> {
        for slot in node.dependency_slots() {
            let service_type = slot.type_name.as_deref().ok_or_else(|| {
                Error::configuration(format!(
                    "cannot determine the service type of dependency `{}` on node type `{}`",
                    slot.name, type_name
                ))
            })?;
            let locator = self.services.as_ref().ok_or_else(|| {
                Error::configuration(format!(
                    "node type `{}` declares dependency `{}` but no service locator is configured",
                    type_name, slot.name
                ))
            })?;
            let service = locator.locate(service_type).ok_or_else(|| {
                Error::configuration(format!(
                    "no service `{}` available for dependency `{}` of node type `{}`",
                    service_type, slot.name, type_name
                ))
            })?;
            node.fill_dependency(&slot.name, service)?;
        }
        Ok(())
    }

    /// Boot an instance at most once, however many declarations share it
    fn boot(&self, instance: &Arc<dyn Transform>, owner: &dyn Record) -> Result<()> {
        if self.cache.boot_once(instance, || instance.boot(owner))? {
            log::debug!("booted node `{}`", instance.name());
        }
        Ok(())
    }

    fn build_leaf(
        &self,
        resolution: Resolution,
        declaration: &Declaration,
        owner: &dyn Record,
    ) -> Result<Leaf> {
        let args_key = cache_key(&declaration.call_args);
        let args = declaration.call_args.clone();

        match resolution {
            Resolution::Instance {
                key,
                instance,
                class,
            } => {
                let target = instance.clone();
                let callable = self.compiled(&key, &args_key, &class, move || {
                    from_fn(move |value, scope| target.transform(value, &args, scope))
                });
                Ok(Leaf::new(callable, class).with_instance(instance))
            }
            Resolution::Method {
                key,
                method,
                arity,
                class,
            } => {
                let name = format!("{}::{}", class, method);
                let target = method.clone();
                let callable = self.compiled(&key, &args_key, &name, move || {
                    from_fn(move |value, scope| {
                        let context = match arity {
                            MethodArity::ValueContext => Some(scope.context),
                            MethodArity::Value => None,
                        };
                        scope.record.call_method(
                            &target,
                            MethodCall {
                                value,
                                args: &args,
                                context,
                                failure: None,
                            },
                        )
                    })
                });
                Ok(Leaf::new(callable, class).with_method(method))
            }
            Resolution::Raw {
                key,
                callable: raw,
                class,
            } => {
                let callable = self.compiled(&key, &args_key, &class, move || {
                    from_fn(move |value, scope| raw(value, &args, scope))
                });
                Ok(Leaf::new(callable, class))
            }
            Resolution::Unresolved => Err(self.unresolved(declaration, owner)),
        }
    }

    /// Fetch or build the instrumented leaf callable for one call-argument set
    fn compiled(
        &self,
        key: &str,
        args_key: &str,
        name: &str,
        build: impl FnOnce() -> Callable,
    ) -> Callable {
        if let Some(callable) = self.cache.compiled(key, args_key) {
            log::trace!("compiled leaf cache hit for `{}` {}", key, args_key);
            return callable;
        }
        self.cache
            .store_compiled(key, args_key, instrument(name.to_string(), build()))
    }

    fn unresolved(&self, declaration: &Declaration, owner: &dyn Record) -> Error {
        let name = declaration.name();
        let mut message = format!(
            "cannot resolve node `{}`: not a known node type, record `{}` has no method `{}`, and no fallback matched",
            name,
            owner.record_type(),
            method_name_for(&name)
        );
        if self.factory.is_none() {
            message.push_str(" (no node factory configured)");
        }
        Error::configuration(message)
    }
}

fn constructor_key(declaration: &Declaration) -> String {
    declaration
        .constructor_args
        .as_deref()
        .map(cache_key)
        .unwrap_or_else(|| "-".to_string())
}
