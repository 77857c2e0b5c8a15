//! Node types, the transform capability and default composition
//!
//! Copyright (c) 2025 Fieldchain Team
//! Licensed under the Apache-2.0 license

use crate::args::Arg;
use crate::error::Result;
use crate::record::{Direction, Record};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// A compiled pipeline step: value in, value out
pub type Callable = Arc<dyn Fn(Value, &Scope<'_>) -> Result<Value> + Send + Sync>;

static NO_CONTEXT: Value = Value::Null;

/// Everything a node can see while it runs
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    pub record: &'a dyn Record,
    pub context: &'a Value,
    pub direction: Direction,
    /// Push node names onto the path-trace stack while running
    pub trace_paths: bool,
}

impl<'a> Scope<'a> {
    pub fn new(record: &'a dyn Record, direction: Direction) -> Self {
        Self {
            record,
            context: &NO_CONTEXT,
            direction,
            trace_paths: false,
        }
    }

    pub fn with_context(mut self, context: &'a Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_trace(mut self, enabled: bool) -> Self {
        self.trace_paths = enabled;
        self
    }
}

impl fmt::Debug for Scope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("record", &self.record.record_type())
            .field("direction", &self.direction)
            .field("trace_paths", &self.trace_paths)
            .finish()
    }
}

/// A dependency a node type wants injected after construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySlot {
    pub name: String,
    /// Service type to look up; `None` means the type could not be determined
    pub type_name: Option<String>,
}

impl DependencySlot {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: Some(type_name.into()),
        }
    }

    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: None,
        }
    }
}

/// The capability every leaf transformer or validator implements
///
/// Validators return the value unchanged or fail. The hooks run once per instance,
/// in order: dependency population (while the instance is still exclusively owned),
/// then `boot`.
pub trait Transform: Send + Sync {
    fn transform(&self, value: Value, args: &[Arg], scope: &Scope<'_>) -> Result<Value>;

    /// Diagnostic name
    fn name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    fn dependency_slots(&self) -> Vec<DependencySlot> {
        Vec::new()
    }

    fn fill_dependency(&mut self, _slot: &str, _service: Arc<dyn Any + Send + Sync>) -> Result<()> {
        Ok(())
    }

    /// One-time setup; may read the record that first caused resolution
    fn boot(&self, _owner: &dyn Record) -> Result<()> {
        Ok(())
    }
}

/// Wrap a closure as a [`Callable`]
pub fn from_fn<F>(f: F) -> Callable
where
    F: Fn(Value, &Scope<'_>) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// The callable that returns its input
pub fn identity() -> Callable {
    from_fn(|value, _scope| Ok(value))
}

/// Default composition of `children` with nothing upstream
pub fn chain(children: &[Node]) -> Callable {
    Pipe.compose(children, identity())
}

/// A wiring strategy for a composite node
pub trait Compose: Send + Sync {
    /// Build the callable for `children`, fed by `upstream`
    fn compose(&self, children: &[Node], upstream: Callable) -> Callable;
}

/// Left-to-right piping: the first child sees the upstream output first
#[derive(Debug, Clone, Copy, Default)]
pub struct Pipe;

impl Compose for Pipe {
    fn compose(&self, children: &[Node], upstream: Callable) -> Callable {
        children
            .iter()
            .fold(upstream, |built, child| child.wrap(built))
    }
}

/// A node wrapping one resolved transform
pub struct Leaf {
    callable: Callable,
    instance: Option<Arc<dyn Transform>>,
    origin_class: String,
    origin_method: Option<String>,
}

impl Leaf {
    pub fn new(callable: Callable, origin_class: impl Into<String>) -> Self {
        Self {
            callable,
            instance: None,
            origin_class: origin_class.into(),
            origin_method: None,
        }
    }

    pub fn with_instance(mut self, instance: Arc<dyn Transform>) -> Self {
        self.instance = Some(instance);
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.origin_method = Some(method.into());
        self
    }

    /// Diagnostic name, `Class` or `Class::method`
    pub fn name(&self) -> String {
        match &self.origin_method {
            Some(method) => format!("{}::{}", self.origin_class, method),
            None => self.origin_class.clone(),
        }
    }

    pub fn callable(&self) -> &Callable {
        &self.callable
    }

    /// Backing instance for stateful node types
    pub fn instance(&self) -> Option<&Arc<dyn Transform>> {
        self.instance.as_ref()
    }

    pub fn origin_class(&self) -> &str {
        &self.origin_class
    }

    pub fn origin_method(&self) -> Option<&str> {
        self.origin_method.as_deref()
    }
}

/// A node wiring child nodes together with a strategy
pub struct Composite {
    name: String,
    children: Vec<Node>,
    strategy: Box<dyn Compose>,
    compiled: OnceLock<Callable>,
}

impl Composite {
    pub fn new(name: impl Into<String>, children: Vec<Node>, strategy: impl Compose + 'static) -> Self {
        Self {
            name: name.into(),
            children,
            strategy: Box::new(strategy),
            compiled: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }
}

/// A compiled unit of a pipeline
pub enum Node {
    Leaf(Leaf),
    Composite(Composite),
}

impl Node {
    pub fn name(&self) -> String {
        match self {
            Node::Leaf(leaf) => leaf.name(),
            Node::Composite(composite) => composite.name.clone(),
        }
    }

    /// Build the callable for this node fed by `upstream`.
    ///
    /// A composite composes once; later calls return the first result, so a node
    /// belongs to exactly one position in one pipeline.
    pub fn wrap(&self, upstream: Callable) -> Callable {
        match self {
            Node::Leaf(leaf) => {
                let inner = leaf.callable.clone();
                from_fn(move |value, scope| {
                    let value = upstream(value, scope)?;
                    inner(value, scope)
                })
            }
            Node::Composite(composite) => composite
                .compiled
                .get_or_init(|| composite.strategy.compose(&composite.children, upstream))
                .clone(),
        }
    }

    /// Build the callable for this node with nothing upstream
    pub fn compile(&self) -> Callable {
        self.wrap(identity())
    }
}

impl fmt::Debug for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Leaf").field(&self.name()).finish()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Leaf(leaf) => f.debug_tuple("Leaf").field(&leaf.name()).finish(),
            Node::Composite(composite) => f
                .debug_struct("Composite")
                .field("name", &composite.name)
                .field("children", &composite.children)
                .finish(),
        }
    }
}
