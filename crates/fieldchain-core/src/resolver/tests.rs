//! Tests for node resolution and memoization
//!
//! Copyright (c) 2025 Fieldchain Team
//! Licensed under the Apache-2.0 license

#[cfg(test)]
mod tests {
    use super::super::{Fallback, FallbackResolver, NodeCache, NodeRegistry, NodeResolver, ServiceRegistry};
    use crate::args::Arg;
    use crate::declaration::{Declaration, Modifier};
    use crate::error::{Error, Result};
    use crate::node::{DependencySlot, Scope, Transform};
    use crate::record::{Direction, MethodArity, Record};
    use crate::testing::{Suffix, TestRecord};
    use serde_json::{json, Value};
    use std::any::Any;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    fn counting_registry(counter: Arc<AtomicUsize>) -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        registry.register("Suffix", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Suffix::new())
        });
        registry
    }

    fn run(leaf: &crate::node::Leaf, record: &TestRecord, value: Value) -> Result<Value> {
        let scope = Scope::new(record, Direction::Inbound);
        (leaf.callable())(value, &scope)
    }

    #[test]
    fn test_instance_declaration_is_wrapped_directly() {
        let cache = Arc::new(NodeCache::new());
        let resolver = NodeResolver::new(cache.clone());
        let record = TestRecord::new("Doc");
        let suffix = Arc::new(Suffix::new());
        let boots = suffix.boots.clone();
        let instance: Arc<dyn Transform> = suffix;

        let first = resolver
            .resolve(&Declaration::instance(instance.clone()).args(["!"]), &record)
            .unwrap();
        let second = resolver
            .resolve(&Declaration::instance(instance.clone()).args(["?"]), &record)
            .unwrap();

        assert_eq!(first.name(), "Suffix");
        assert_eq!(run(&first, &record, json!("hi")).unwrap(), json!("hi!"));
        assert_eq!(run(&second, &record, json!("hi")).unwrap(), json!("hi?"));
        assert_eq!(boots.load(Ordering::SeqCst), 1);
        assert_eq!(cache.instantiations(), 0);
    }

    #[test]
    fn test_identical_constructor_args_share_one_instance() {
        let counter = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(NodeCache::new());
        let resolver = NodeResolver::new(cache.clone())
            .with_factory(Arc::new(counting_registry(counter.clone())));
        let record = TestRecord::new("Doc");

        let a = resolver.resolve(&Declaration::named("Suffix").args(["-a"]), &record).unwrap();
        let b = resolver.resolve(&Declaration::named("Suffix").args(["-b"]), &record).unwrap();
        let a_again = resolver.resolve(&Declaration::named("Suffix").args(["-a"]), &record).unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(cache.instantiations(), 1);
        assert!(Arc::ptr_eq(a.instance().unwrap(), b.instance().unwrap()));
        assert!(!Arc::ptr_eq(a.callable(), b.callable()));
        assert!(Arc::ptr_eq(a.callable(), a_again.callable()));
        assert_eq!(run(&b, &record, json!("x")).unwrap(), json!("x-b"));

        let snapshot = cache.dump();
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.entries[0].key, "type:Suffix|-");
        assert_eq!(snapshot.entries[0].compiled.len(), 2);
    }

    #[test]
    fn test_different_constructor_args_get_distinct_instances() {
        let counter = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(NodeCache::new());
        let resolver =
            NodeResolver::new(cache.clone()).with_factory(Arc::new(counting_registry(counter.clone())));
        let record = TestRecord::new("Doc");

        let a = resolver
            .resolve(&Declaration::named("Suffix").construct_with([1]), &record)
            .unwrap();
        let b = resolver
            .resolve(&Declaration::named("Suffix").construct_with([2]), &record)
            .unwrap();

        assert!(!Arc::ptr_eq(a.instance().unwrap(), b.instance().unwrap()));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(cache.contains("type:Suffix|[1]"));
        assert!(cache.contains("type:Suffix|[2]"));
    }

    #[test]
    fn test_missing_required_constructor_args() {
        let mut registry = NodeRegistry::new();
        registry.register_with_args("Between", |_| Ok(Suffix::new()));
        let resolver = NodeResolver::new(Arc::new(NodeCache::new())).with_factory(Arc::new(registry));
        let record = TestRecord::new("Doc");

        let err = resolver.resolve(&Declaration::named("Between"), &record).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("requires constructor arguments"));
        assert!(resolver
            .resolve(&Declaration::named("Between").construct_with([1, 5]), &record)
            .is_ok());
    }

    #[test]
    fn test_type_without_capability_is_a_configuration_error() {
        let mut registry = NodeRegistry::new();
        registry.register_foreign("Money");
        let resolver = NodeResolver::new(Arc::new(NodeCache::new())).with_factory(Arc::new(registry));
        let record = TestRecord::new("Doc");

        let err = resolver.resolve(&Declaration::named("Money"), &record).unwrap_err();
        assert!(err.to_string().contains("does not implement the transform capability"));
    }

    #[test]
    fn test_constructor_failure_keeps_cause() {
        let mut registry = NodeRegistry::new();
        registry.register_with_args("Strict", |args: &[Arg]| -> anyhow::Result<Suffix> {
            anyhow::bail!("expected 2 arguments, got {}", args.len())
        });
        let resolver = NodeResolver::new(Arc::new(NodeCache::new())).with_factory(Arc::new(registry));
        let record = TestRecord::new("Doc");

        let err = resolver
            .resolve(&Declaration::named("Strict").construct_with([1]), &record)
            .unwrap_err();
        match err {
            Error::Configuration { source, .. } => {
                assert!(source.unwrap().to_string().contains("got 1"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_record_method_by_convention() {
        let resolver = NodeResolver::new(Arc::new(NodeCache::new()));
        let record = TestRecord::new("Customer")
            .with_context(json!({"prefix": ">"}))
            .with_method("normalize_name", MethodArity::ValueContext, |call| {
                let prefix = call
                    .context
                    .and_then(|c| c.get("prefix"))
                    .and_then(Value::as_str)
                    .unwrap_or("");
                let suffix = call.args.first().and_then(Arg::as_str).unwrap_or("");
                Ok(json!(format!("{}{}{}", prefix, call.value.as_str().unwrap_or(""), suffix)))
            });

        let leaf = resolver
            .resolve(&Declaration::named("NormalizeName").args(["<"]), &record)
            .unwrap();
        assert_eq!(leaf.name(), "Customer::normalize_name");

        let context = record.context();
        let scope = Scope::new(&record, Direction::Inbound).with_context(&context);
        assert_eq!((leaf.callable())(json!("ann"), &scope).unwrap(), json!(">ann<"));
    }

    #[test]
    fn test_registered_type_wins_over_record_method() {
        let resolver = NodeResolver::new(Arc::new(NodeCache::new()))
            .with_factory(Arc::new(counting_registry(Arc::new(AtomicUsize::new(0)))));
        let record = TestRecord::new("Doc")
            .with_method("suffix", MethodArity::Value, |_| Ok(json!("method")));

        let leaf = resolver.resolve(&Declaration::named("Suffix").args(["!"]), &record).unwrap();
        assert!(leaf.instance().is_some());
        assert_eq!(run(&leaf, &record, json!("type")).unwrap(), json!("type!"));
    }

    struct Fallbacks;

    impl FallbackResolver for Fallbacks {
        fn resolve(&self, identity: &str, _declaration: &Declaration, _owner: &dyn Record) -> Option<Fallback> {
            match identity {
                "Shout" => Some(Fallback::Callable(Arc::new(
                    |value: Value, _args: &[Arg], _scope: &Scope<'_>| -> Result<Value> {
                        Ok(json!(value.as_str().unwrap_or("").to_uppercase()))
                    },
                ))),
                "Exclaim" => Some(Fallback::Node(Arc::new(Suffix::new()))),
                _ => None,
            }
        }
    }

    #[test]
    fn test_fallback_resolver_is_consulted_last() {
        let resolver = NodeResolver::new(Arc::new(NodeCache::new())).with_fallback(Arc::new(Fallbacks));
        let record = TestRecord::new("Doc");

        let shout = resolver.resolve(&Declaration::named("Shout"), &record).unwrap();
        assert_eq!(run(&shout, &record, json!("hey")).unwrap(), json!("HEY"));

        let exclaim = resolver.resolve(&Declaration::named("Exclaim").args(["!"]), &record).unwrap();
        assert_eq!(run(&exclaim, &record, json!("hey")).unwrap(), json!("hey!"));

        let err = resolver.resolve(&Declaration::named("Whisper"), &record).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("cannot resolve node `Whisper`"));
        assert!(err.to_string().contains("no node factory configured"));
    }

    #[test]
    fn test_modifier_is_not_a_leaf() {
        let resolver = NodeResolver::new(Arc::new(NodeCache::new()));
        let record = TestRecord::new("Doc");
        let err = resolver
            .resolve(&Modifier::Each { count: None }.into(), &record)
            .unwrap_err();
        assert!(err.to_string().contains("modifier `Each`"));
    }

    #[derive(Default)]
    struct Greeter {
        greeting: Option<Arc<String>>,
        typed: bool,
    }

    impl Transform for Greeter {
        fn transform(&self, value: Value, _args: &[Arg], _scope: &Scope<'_>) -> Result<Value> {
            let greeting = self.greeting.as_deref().map(String::as_str).unwrap_or("?");
            Ok(json!(format!("{} {}", greeting, value.as_str().unwrap_or(""))))
        }

        fn dependency_slots(&self) -> Vec<DependencySlot> {
            if self.typed {
                vec![DependencySlot::new("greeting", "Greeting")]
            } else {
                vec![DependencySlot::untyped("greeting")]
            }
        }

        fn fill_dependency(&mut self, slot: &str, service: Arc<dyn Any + Send + Sync>) -> Result<()> {
            if slot == "greeting" {
                self.greeting = service.downcast::<String>().ok();
            }
            Ok(())
        }
    }

    #[test]
    fn test_dependencies_are_populated_from_the_locator() {
        let mut registry = NodeRegistry::new();
        registry.register("Greeter", |_| Ok(Greeter { greeting: None, typed: true }));
        let mut services = ServiceRegistry::new();
        services.register("Greeting", String::from("hello"));

        let resolver = NodeResolver::new(Arc::new(NodeCache::new()))
            .with_factory(Arc::new(registry))
            .with_services(Arc::new(services));
        let record = TestRecord::new("Doc");

        let leaf = resolver.resolve(&Declaration::named("Greeter"), &record).unwrap();
        assert_eq!(run(&leaf, &record, json!("bob")).unwrap(), json!("hello bob"));
    }

    #[test]
    fn test_dependency_failures_are_loud() {
        let mut registry = NodeRegistry::new();
        registry.register_default::<Greeter>("Untyped");
        registry.register("Typed", |_| Ok(Greeter { greeting: None, typed: true }));
        let registry = Arc::new(registry);
        let record = TestRecord::new("Doc");

        let with_locator = NodeResolver::new(Arc::new(NodeCache::new()))
            .with_factory(registry.clone())
            .with_services(Arc::new(ServiceRegistry::new()));
        let err = with_locator.resolve(&Declaration::named("Untyped"), &record).unwrap_err();
        assert!(err.to_string().contains("cannot determine the service type"));
        let err = with_locator.resolve(&Declaration::named("Typed"), &record).unwrap_err();
        assert!(err.to_string().contains("no service `Greeting`"));

        let without_locator = NodeResolver::new(Arc::new(NodeCache::new())).with_factory(registry);
        let err = without_locator.resolve(&Declaration::named("Typed"), &record).unwrap_err();
        assert!(err.to_string().contains("no service locator is configured"));
    }

    struct PickyBoot {
        attempts: AtomicUsize,
    }

    impl Transform for PickyBoot {
        fn transform(&self, value: Value, _args: &[Arg], _scope: &Scope<'_>) -> Result<Value> {
            Ok(value)
        }

        fn boot(&self, owner: &dyn Record) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if owner.record_type() == "Broken" {
                return Err(Error::configuration("cannot boot for Broken"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_failed_boot_is_retried_and_success_is_remembered() {
        let cache = Arc::new(NodeCache::new());
        let resolver = NodeResolver::new(cache.clone());
        let node = Arc::new(PickyBoot { attempts: AtomicUsize::new(0) });
        let instance: Arc<dyn Transform> = node.clone();
        let declaration = Declaration::instance(instance.clone());

        assert!(resolver.resolve(&declaration, &TestRecord::new("Broken")).is_err());
        assert!(!cache.is_booted(&instance));
        assert!(resolver.resolve(&declaration, &TestRecord::new("Doc")).is_ok());
        assert!(resolver.resolve(&declaration, &TestRecord::new("Other")).is_ok());
        assert_eq!(node.attempts.load(Ordering::SeqCst), 2);
    }

    /// Reports the text it was constructed with
    struct Holder(String);

    impl Transform for Holder {
        fn transform(&self, _value: Value, _args: &[Arg], _scope: &Scope<'_>) -> Result<Value> {
            Ok(json!(self.0))
        }

        fn name(&self) -> &str {
            "Holder"
        }
    }

    #[test]
    fn test_dropped_object_args_never_alias_new_ones() {
        let mut registry = NodeRegistry::new();
        registry.register_with_args("Holder", |args: &[Arg]| -> anyhow::Result<Holder> {
            match args.first() {
                Some(Arg::Object { handle, .. }) => handle
                    .downcast_ref::<String>()
                    .map(|text| Holder(text.clone()))
                    .ok_or_else(|| anyhow::anyhow!("expected a string object")),
                _ => anyhow::bail!("expected an object argument"),
            }
        });
        let cache = Arc::new(NodeCache::new());
        let resolver = NodeResolver::new(cache.clone()).with_factory(Arc::new(registry));
        let record = TestRecord::new("Doc");

        for i in 0..200 {
            let declaration = Declaration::named("Holder")
                .construct_with([Arg::object("Config", Arc::new(format!("config-{i}")))]);
            let leaf = resolver.resolve(&declaration, &record).unwrap();
            assert_eq!(run(&leaf, &record, json!(null)).unwrap(), json!(format!("config-{i}")));
        }
        assert_eq!(cache.instantiations(), 200);
        assert_eq!(cache.len(), 200);
    }

    /// Refuses to transform until booted; booting takes a while
    struct SlowBoot {
        booted: AtomicBool,
        boots: Arc<AtomicUsize>,
    }

    impl Transform for SlowBoot {
        fn transform(&self, value: Value, _args: &[Arg], _scope: &Scope<'_>) -> Result<Value> {
            if !self.booted.load(Ordering::SeqCst) {
                return Err(Error::configuration("used before boot finished"));
            }
            Ok(value)
        }

        fn name(&self) -> &str {
            "SlowBoot"
        }

        fn boot(&self, _owner: &dyn Record) -> Result<()> {
            thread::sleep(Duration::from_millis(20));
            self.boots.fetch_add(1, Ordering::SeqCst);
            self.booted.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_concurrent_first_use_shares_one_booted_instance() {
        let boots = Arc::new(AtomicUsize::new(0));
        let counter = boots.clone();
        let mut registry = NodeRegistry::new();
        registry.register("SlowBoot", move |_| {
            Ok(SlowBoot {
                booted: AtomicBool::new(false),
                boots: counter.clone(),
            })
        });
        let cache = Arc::new(NodeCache::new());
        let resolver = NodeResolver::new(cache.clone()).with_factory(Arc::new(registry));
        let declaration = Declaration::named("SlowBoot");
        let barrier = Barrier::new(8);

        let instances: Vec<Arc<dyn Transform>> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        let record = TestRecord::new("Doc");
                        barrier.wait();
                        let leaf = resolver.resolve(&declaration, &record).unwrap();
                        assert_eq!(run(&leaf, &record, json!("v")).unwrap(), json!("v"));
                        leaf.instance().unwrap().clone()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
        assert_eq!(boots.load(Ordering::SeqCst), 1);
        let snapshot = cache.dump();
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.entries[0].key, "type:SlowBoot|-");
        assert_eq!(snapshot.booted, 1);
    }
}
