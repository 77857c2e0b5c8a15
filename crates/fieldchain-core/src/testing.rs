//! Shared fixtures for unit tests

#![cfg(test)]

use crate::args::Arg;
use crate::error::{ProcessingError, Result};
use crate::node::{Scope, Transform};
use crate::record::{Direction, MethodArity, MethodCall, Record};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type MethodFn = Arc<dyn Fn(MethodCall<'_>) -> Result<Value> + Send + Sync>;

/// A record backed by plain maps
#[derive(Clone)]
pub struct TestRecord {
    record_type: String,
    fields: BTreeMap<String, Value>,
    groups: Vec<String>,
    context: Value,
    methods: HashMap<String, (MethodArity, MethodFn)>,
}

impl TestRecord {
    pub fn new(record_type: &str) -> Self {
        Self {
            record_type: record_type.to_string(),
            fields: BTreeMap::new(),
            groups: Vec::new(),
            context: Value::Null,
            methods: HashMap::new(),
        }
    }

    pub fn with_field(mut self, field: &str, value: Value) -> Self {
        self.fields.insert(field.to_string(), value);
        self
    }

    pub fn with_groups(mut self, groups: &[&str]) -> Self {
        self.groups = groups.iter().map(|g| g.to_string()).collect();
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_method<F>(mut self, name: &str, arity: MethodArity, f: F) -> Self
    where
        F: Fn(MethodCall<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.methods.insert(name.to_string(), (arity, Arc::new(f)));
        self
    }
}

impl Record for TestRecord {
    fn record_type(&self) -> &str {
        &self.record_type
    }

    fn method_arity(&self, method: &str) -> Option<MethodArity> {
        self.methods.get(method).map(|(arity, _)| *arity)
    }

    fn call_method(&self, method: &str, call: MethodCall<'_>) -> Result<Value> {
        match self.methods.get(method) {
            Some((_, f)) => f(call),
            None => Err(crate::Error::configuration(format!("no method `{}`", method))),
        }
    }

    fn active_groups(&self, _direction: Direction) -> Vec<String> {
        self.groups.clone()
    }

    fn context(&self) -> Value {
        self.context.clone()
    }

    fn get(&self, field: &str) -> Option<Value> {
        self.fields.get(field).cloned()
    }

    fn set(&mut self, field: &str, value: Value) {
        self.fields.insert(field.to_string(), value);
    }

    fn unfill(&mut self, field: &str) {
        self.fields.remove(field);
    }
}

/// Appends its first call argument to a string value and counts constructions
pub struct Suffix {
    pub boots: Arc<AtomicUsize>,
}

impl Suffix {
    pub fn new() -> Self {
        Self {
            boots: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Transform for Suffix {
    fn transform(&self, value: Value, args: &[Arg], _scope: &Scope<'_>) -> Result<Value> {
        let suffix = args.first().and_then(Arg::as_str).unwrap_or("");
        Ok(Value::String(format!("{}{}", value.as_str().unwrap_or_default(), suffix)))
    }

    fn name(&self) -> &str {
        "Suffix"
    }

    fn boot(&self, _owner: &dyn Record) -> Result<()> {
        self.boots.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Always fails with the template given as first call argument
pub struct Fails;

impl Transform for Fails {
    fn transform(&self, value: Value, args: &[Arg], _scope: &Scope<'_>) -> Result<Value> {
        let template = args.first().and_then(Arg::as_str).unwrap_or("fails");
        Err(ProcessingError::new(template).with_param("value", value).into())
    }

    fn name(&self) -> &str {
        "Fails"
    }
}
