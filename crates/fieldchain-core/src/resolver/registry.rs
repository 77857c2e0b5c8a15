//! Collaborators consulted during resolution
//!
//! The core does not know how node types are constructed or where services come
//! from. It asks a [`NodeFactory`] to describe and build types, a [`ServiceLocator`]
//! to fill dependency slots, and a [`FallbackResolver`] as last resort. The in-memory
//! [`NodeRegistry`] and [`ServiceRegistry`] cover tests and simple applications.
//!
//! Copyright (c) 2025 Fieldchain Team
//! Licensed under the Apache-2.0 license

use crate::args::Arg;
use crate::declaration::Declaration;
use crate::error::{Error, Result};
use crate::node::{Scope, Transform};
use crate::record::Record;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// What a factory knows about a type name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeInfo {
    /// The type implements [`Transform`]
    pub implements_transform: bool,
    /// The type cannot be built without constructor arguments
    pub requires_arguments: bool,
}

/// Describes and instantiates named node types
pub trait NodeFactory: Send + Sync {
    /// `None` if the name is unknown
    fn describe(&self, type_name: &str) -> Option<TypeInfo>;

    /// Build an instance; `args` is `None` when the declaration has no constructor arguments
    fn instantiate(&self, type_name: &str, args: Option<&[Arg]>) -> Result<Box<dyn Transform>>;
}

/// Supplies services for dependency slots
pub trait ServiceLocator: Send + Sync {
    fn locate(&self, type_name: &str) -> Option<Arc<dyn Any + Send + Sync>>;
}

/// A raw invocable returned by a fallback resolver
pub type RawCallable = Arc<dyn Fn(Value, &[Arg], &Scope<'_>) -> Result<Value> + Send + Sync>;

/// What a fallback resolver may hand back
pub enum Fallback {
    Node(Arc<dyn Transform>),
    Callable(RawCallable),
}

/// Application hook consulted when no built-in strategy matches
pub trait FallbackResolver: Send + Sync {
    fn resolve(&self, identity: &str, declaration: &Declaration, owner: &dyn Record) -> Option<Fallback>;
}

type Constructor = Arc<dyn Fn(&[Arg]) -> anyhow::Result<Box<dyn Transform>> + Send + Sync>;

struct RegistryEntry {
    info: TypeInfo,
    constructor: Option<Constructor>,
}

/// Name-to-constructor registry
#[derive(Default)]
pub struct NodeRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the [`built_in`](crate::built_in) nodes
    pub fn with_built_ins() -> Self {
        let mut registry = Self::new();
        crate::built_in::register_all(&mut registry);
        registry
    }

    /// Register a type that can be built with or without arguments.
    /// Without declared constructor arguments the constructor receives an empty slice.
    pub fn register<T, F>(&mut self, type_name: impl Into<String>, constructor: F) -> &mut Self
    where
        T: Transform + 'static,
        F: Fn(&[Arg]) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.insert(type_name.into(), false, constructor)
    }

    /// Register a type that needs constructor arguments
    pub fn register_with_args<T, F>(&mut self, type_name: impl Into<String>, constructor: F) -> &mut Self
    where
        T: Transform + 'static,
        F: Fn(&[Arg]) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.insert(type_name.into(), true, constructor)
    }

    /// Register a zero-argument type through its `Default` impl
    pub fn register_default<T>(&mut self, type_name: impl Into<String>) -> &mut Self
    where
        T: Transform + Default + 'static,
    {
        self.register(type_name, |_| Ok(T::default()))
    }

    /// Register a name that exists but is not a node type
    pub fn register_foreign(&mut self, type_name: impl Into<String>) -> &mut Self {
        self.entries.insert(
            type_name.into(),
            RegistryEntry {
                info: TypeInfo {
                    implements_transform: false,
                    requires_arguments: false,
                },
                constructor: None,
            },
        );
        self
    }

    fn insert<T, F>(&mut self, type_name: String, requires_arguments: bool, constructor: F) -> &mut Self
    where
        T: Transform + 'static,
        F: Fn(&[Arg]) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let constructor: Constructor =
            Arc::new(move |args: &[Arg]| constructor(args).map(|node| Box::new(node) as Box<dyn Transform>));
        self.entries.insert(
            type_name,
            RegistryEntry {
                info: TypeInfo {
                    implements_transform: true,
                    requires_arguments,
                },
                constructor: Some(constructor),
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl NodeFactory for NodeRegistry {
    fn describe(&self, type_name: &str) -> Option<TypeInfo> {
        self.entries.get(type_name).map(|entry| entry.info)
    }

    fn instantiate(&self, type_name: &str, args: Option<&[Arg]>) -> Result<Box<dyn Transform>> {
        let entry = self.entries.get(type_name).ok_or_else(|| {
            Error::configuration(format!("node type `{}` is not registered", type_name))
        })?;
        let constructor = entry.constructor.as_ref().ok_or_else(|| {
            Error::configuration(format!(
                "type `{}` does not implement the transform capability",
                type_name
            ))
        })?;
        constructor(args.unwrap_or(&[])).map_err(|source| Error::Configuration {
            message: format!("failed to construct node type `{}`", type_name),
            source: Some(source),
        })
    }
}

/// Type-name-to-service map
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Any + Send + Sync>(&mut self, type_name: impl Into<String>, service: T) -> &mut Self {
        self.services.insert(type_name.into(), Arc::new(service));
        self
    }
}

impl ServiceLocator for ServiceRegistry {
    fn locate(&self, type_name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.services.get(type_name).cloned()
    }
}
