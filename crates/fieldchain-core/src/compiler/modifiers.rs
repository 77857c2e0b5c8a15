//! Composition strategies installed by chain modifiers
//!
//! Each strategy receives the compiled children of one modifier and the callable
//! built from everything upstream of it, and returns the callable that replaces the
//! default left-to-right fold.
//!
//! Copyright (c) 2025 Fieldchain Team
//! Licensed under the Apache-2.0 license

use crate::args::Arg;
use crate::declaration::{Failure, FailureHandler};
use crate::error::{templates, value_kind, Error, ProcessingError, Result};
use crate::node::{chain, from_fn, snapshot, Callable, Compose, Node, Scope, TraceGuard};
use crate::record::MethodCall;
use serde_json::{Map, Value};

fn branches(children: &[Node]) -> Vec<Callable> {
    children.iter().map(Node::compile).collect()
}

/// Finish an error raised by a strategy itself: `origin` names the strategy, and
/// while tracing the path ends with it
fn raised_by(mut err: ProcessingError, origin: &str, scope: &Scope<'_>) -> Error {
    err.set_origin_if_absent(origin);
    if scope.trace_paths {
        let mut path = snapshot();
        path.push(origin.to_string());
        err.set_path_if_absent(path);
    }
    err.into()
}

/// Apply the sub-chain to every element of an array, or every value of an object
#[derive(Debug, Clone, Copy, Default)]
pub struct Each;

fn apply_element(inner: &Callable, index: usize, item: Value, scope: &Scope<'_>) -> Result<Value> {
    let _frame = scope
        .trace_paths
        .then(|| TraceGuard::enter(format!("[{}]", index)));
    inner(item, scope).map_err(|err| err.map_processing(|e| e.prepend_index(index)))
}

impl Compose for Each {
    fn compose(&self, children: &[Node], upstream: Callable) -> Callable {
        let inner = chain(children);
        from_fn(move |value, scope| match upstream(value, scope)? {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| apply_element(&inner, index, item, scope))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(entries) => entries
                .into_iter()
                .enumerate()
                .map(|(index, (key, item))| {
                    apply_element(&inner, index, item, scope).map(|item| (key, item))
                })
                .collect::<Result<Map<String, Value>>>()
                .map(Value::Object),
            other => {
                let err = ProcessingError::new(templates::NOT_ITERABLE)
                    .with_param("type", value_kind(&other));
                Err(raised_by(err, "Each", scope))
            }
        })
    }
}

/// Run every child on the same input and gather the outputs
#[derive(Debug, Clone, Default)]
pub struct Collect {
    labels: Option<Vec<String>>,
}

impl Collect {
    /// `None` collects into an array, labels collect into an object in label order
    pub fn new(labels: Option<Vec<String>>) -> Self {
        Self { labels }
    }
}

impl Compose for Collect {
    fn compose(&self, children: &[Node], upstream: Callable) -> Callable {
        let branches = branches(children);
        let labels = self.labels.clone();
        from_fn(move |value, scope| {
            let value = upstream(value, scope)?;
            match &labels {
                None => branches
                    .iter()
                    .map(|branch| branch(value.clone(), scope))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array),
                Some(labels) => labels
                    .iter()
                    .zip(&branches)
                    .map(|(label, branch)| branch(value.clone(), scope).map(|out| (label.clone(), out)))
                    .collect::<Result<Map<String, Value>>>()
                    .map(Value::Object),
            }
        })
    }
}

/// Return the output of the first child that succeeds
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstSuccess;

impl Compose for FirstSuccess {
    fn compose(&self, children: &[Node], upstream: Callable) -> Callable {
        let branches = branches(children);
        from_fn(move |value, scope| {
            let value = upstream(value, scope)?;
            if branches.is_empty() {
                return Ok(value);
            }
            let mut failures = Vec::with_capacity(branches.len());
            for branch in &branches {
                match branch(value.clone(), scope) {
                    Ok(out) => return Ok(out),
                    Err(Error::Processing(err)) => failures.push(*err),
                    Err(other) => return Err(other),
                }
            }
            let err = ProcessingError::aggregate(branches.len(), &failures);
            Err(raised_by(err, "Any", scope))
        })
    }
}

/// Run every child on the same input; the input passes through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct AllOf;

impl Compose for AllOf {
    fn compose(&self, children: &[Node], upstream: Callable) -> Callable {
        let branches = branches(children);
        from_fn(move |value, scope| {
            let value = upstream(value, scope)?;
            for branch in &branches {
                branch(value.clone(), scope)?;
            }
            Ok(value)
        })
    }
}

/// Truthiness of a predicate result
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(entries) => !entries.is_empty(),
    }
}

/// Apply or skip the sub-chain depending on a predicate
pub struct Conditional {
    predicate: Callable,
    negate: bool,
    otherwise: Option<Value>,
}

impl Conditional {
    pub fn new(predicate: Callable, negate: bool, otherwise: Option<Value>) -> Self {
        Self {
            predicate,
            negate,
            otherwise,
        }
    }
}

impl Compose for Conditional {
    fn compose(&self, children: &[Node], upstream: Callable) -> Callable {
        let inner = chain(children);
        let predicate = self.predicate.clone();
        let negate = self.negate;
        let otherwise = self.otherwise.clone();
        from_fn(move |value, scope| {
            let value = upstream(value, scope)?;
            let verdict = predicate(value.clone(), scope)?;
            if truthy(&verdict) != negate {
                inner(value, scope)
            } else {
                Ok(otherwise.clone().unwrap_or(value))
            }
        })
    }
}

/// Replace a processing failure of the sub-chain with a fallback
pub struct Recover {
    fallback: Arg,
    handler: Option<FailureHandler>,
}

impl Recover {
    pub fn new(fallback: Arg, handler: Option<FailureHandler>) -> Self {
        Self { fallback, handler }
    }
}

impl Compose for Recover {
    fn compose(&self, children: &[Node], upstream: Callable) -> Callable {
        let inner = chain(children);
        let fallback = self.fallback.clone();
        let handler = self.handler.clone();
        from_fn(move |value, scope| {
            let value = upstream(value, scope)?;
            let original = handler.as_ref().map(|_| value.clone());
            let err = match inner(value, scope) {
                Err(Error::Processing(err)) => *err,
                other => return other,
            };
            log::debug!("recovering from `{}` with fallback", err.template);

            let fallback_value = fallback.to_value();
            match (&handler, original) {
                (Some(FailureHandler::RecordMethod(method)), Some(original)) => {
                    scope.record.call_method(
                        method,
                        MethodCall {
                            value: original,
                            args: std::slice::from_ref(&fallback),
                            context: Some(scope.context),
                            failure: Some(&err),
                        },
                    )
                }
                (Some(FailureHandler::Function(handle)), Some(original)) => handle(&Failure {
                    value: &original,
                    fallback: &fallback_value,
                    error: &err,
                    record: scope.record,
                }),
                _ => Ok(fallback_value),
            }
        })
    }
}

/// Rewrite the template of processing failures raised by the sub-chain
pub struct TemplateOverride {
    template: Option<String>,
    map: Vec<(String, String)>,
}

impl TemplateOverride {
    pub fn new(template: Option<String>, map: Vec<(String, String)>) -> Self {
        Self { template, map }
    }

    fn rewrite(template: Option<&str>, map: &[(String, String)], err: &mut ProcessingError) {
        if err.is_template_overridden() {
            return;
        }
        let replacement = map
            .iter()
            .find(|(from, _)| *from == err.template)
            .map(|(_, to)| to.as_str())
            .or(template);
        if let Some(replacement) = replacement {
            err.override_template(replacement);
        }
    }
}

impl Compose for TemplateOverride {
    fn compose(&self, children: &[Node], upstream: Callable) -> Callable {
        let inner = chain(children);
        let template = self.template.clone();
        let map = self.map.clone();
        from_fn(move |value, scope| {
            let value = upstream(value, scope)?;
            inner(value, scope).map_err(|err| {
                err.map_processing(|e| Self::rewrite(template.as_deref(), &map, e))
            })
        })
    }
}
