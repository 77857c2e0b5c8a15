//! Declarations and the cursor-addressed queue they are compiled from
//!
//! A declaration is one node request attached to a field: a leaf identity (type name,
//! record method or ready-made instance) or a chain modifier, together with its
//! arguments. Declarations are immutable; the queue only moves a cursor over them,
//! and modifiers advance that cursor past the siblings they swallow.
//!
//! Copyright (c) 2025 Fieldchain Team
//! Licensed under the Apache-2.0 license

use crate::args::Arg;
use crate::error::{ProcessingError, Result};
use crate::node::Transform;
use crate::record::Record;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// What a declaration refers to
#[derive(Clone)]
pub enum Identity {
    /// A registered type name, or a record method by naming convention
    Named(String),
    /// A self-contained node instance
    Instance(Arc<dyn Transform>),
    /// A chain modifier
    Modifier(Modifier),
}

impl Identity {
    /// Name used in diagnostics and configuration errors
    pub fn display_name(&self) -> String {
        match self {
            Identity::Named(name) => name.clone(),
            Identity::Instance(instance) => instance.name().to_string(),
            Identity::Modifier(modifier) => modifier.name().to_string(),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Identity::Instance(instance) => f.debug_tuple("Instance").field(&instance.name()).finish(),
            Identity::Modifier(modifier) => f.debug_tuple("Modifier").field(modifier).finish(),
        }
    }
}

/// One annotated node request
#[derive(Debug, Clone)]
pub struct Declaration {
    pub identity: Identity,
    /// Arguments passed on every invocation
    pub call_args: Vec<Arg>,
    /// Arguments used to construct a stateful node type
    pub constructor_args: Option<Vec<Arg>>,
}

impl Declaration {
    /// Declare a node by type or method name
    pub fn named(name: impl Into<String>) -> Self {
        Self::from_identity(Identity::Named(name.into()))
    }

    /// Declare a ready-made node instance
    pub fn instance(instance: Arc<dyn Transform>) -> Self {
        Self::from_identity(Identity::Instance(instance))
    }

    /// Declare a chain modifier
    pub fn modifier(modifier: Modifier) -> Self {
        Self::from_identity(Identity::Modifier(modifier))
    }

    fn from_identity(identity: Identity) -> Self {
        Self {
            identity,
            call_args: Vec::new(),
            constructor_args: None,
        }
    }

    /// Set the invocation-time arguments
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        self.call_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the constructor arguments
    pub fn construct_with<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        self.constructor_args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    /// Diagnostic name of the declared identity
    pub fn name(&self) -> String {
        self.identity.display_name()
    }

    pub fn as_modifier(&self) -> Option<&Modifier> {
        match &self.identity {
            Identity::Modifier(modifier) => Some(modifier),
            _ => None,
        }
    }
}

impl From<Modifier> for Declaration {
    fn from(modifier: Modifier) -> Self {
        Declaration::modifier(modifier)
    }
}

/// How many sibling declarations a compile step consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Take {
    /// Everything left in the queue
    All,
    /// Exactly this many entries; fewer is a configuration error
    Exactly(usize),
}

impl Take {
    fn from_count(count: Option<usize>) -> Self {
        count.map(Take::Exactly).unwrap_or(Take::All)
    }
}

impl fmt::Display for Take {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Take::All => write!(f, "all remaining"),
            Take::Exactly(n) => write!(f, "{}", n),
        }
    }
}

/// Shape of a collect group's result
#[derive(Debug, Clone, PartialEq)]
pub enum CollectShape {
    /// An ordered list of this many outputs
    Count(usize),
    /// A map from label to output, one child per label, in label order
    Labels(Vec<String>),
}

/// Everything a failure handler gets to see
pub struct Failure<'a> {
    /// Value that entered the wrapped sub-chain
    pub value: &'a Value,
    /// The configured fallback
    pub fallback: &'a Value,
    /// The error raised by the wrapped sub-chain
    pub error: &'a ProcessingError,
    /// The record being processed
    pub record: &'a dyn Record,
}

/// Static handler signature for fail-to recovery
pub type FailureFn = Arc<dyn Fn(&Failure<'_>) -> Result<Value> + Send + Sync>;

/// Invoked when a fail-to group catches an error; its result replaces the fallback
#[derive(Clone)]
pub enum FailureHandler {
    /// A method on the owning record, called with the original value as `value`,
    /// the fallback as its only argument and the error as `failure`
    RecordMethod(String),
    /// An external function
    Function(FailureFn),
}

impl fmt::Debug for FailureHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureHandler::RecordMethod(name) => f.debug_tuple("RecordMethod").field(name).finish(),
            FailureHandler::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// Declaration kinds that consume sibling declarations and change how they compose
#[derive(Debug, Clone)]
pub enum Modifier {
    /// Group the next children as one sub-chain
    Wrap { count: Option<usize> },
    /// Apply the next children to every element of a collection
    Each { count: Option<usize> },
    /// Run each child against the same input and gather the outputs
    Collect { shape: CollectShape },
    /// Return the output of the first child that succeeds
    Any { count: Option<usize> },
    /// Run every child against the same input; the first failure halts
    All { count: Option<usize> },
    /// Apply or skip the next children depending on a predicate node
    When {
        condition: Box<Declaration>,
        negate: bool,
        count: Option<usize>,
        /// Replacement value when the children are skipped
        otherwise: Option<Arg>,
    },
    /// Replace a failure of the node declared immediately before with a fallback
    FailTo {
        fallback: Arg,
        handler: Option<FailureHandler>,
    },
    /// Replace a failure of the next children with a fallback
    FailNextTo {
        fallback: Arg,
        handler: Option<FailureHandler>,
        count: Option<usize>,
    },
    /// Rewrite the message template of failures raised by the next children
    ErrorTemplate {
        template: Option<String>,
        map: Vec<(String, String)>,
        count: Option<usize>,
    },
    /// Include the next children only while one of these groups is active
    Groups {
        groups: Vec<String>,
        count: Option<usize>,
    },
}

impl Modifier {
    pub fn name(&self) -> &'static str {
        match self {
            Modifier::Wrap { .. } => "Wrap",
            Modifier::Each { .. } => "Each",
            Modifier::Collect { .. } => "Collect",
            Modifier::Any { .. } => "Any",
            Modifier::All { .. } => "All",
            Modifier::When { .. } => "When",
            Modifier::FailTo { .. } => "FailTo",
            Modifier::FailNextTo { .. } => "FailNextTo",
            Modifier::ErrorTemplate { .. } => "ErrorTemplate",
            Modifier::Groups { .. } => "Groups",
        }
    }

    /// Number of sibling declarations this modifier swallows
    pub fn take(&self) -> Take {
        match self {
            Modifier::Wrap { count }
            | Modifier::Each { count }
            | Modifier::Any { count }
            | Modifier::All { count }
            | Modifier::When { count, .. }
            | Modifier::ErrorTemplate { count, .. }
            | Modifier::Groups { count, .. } => Take::from_count(*count),
            Modifier::Collect { shape } => match shape {
                CollectShape::Count(n) => Take::Exactly(*n),
                CollectShape::Labels(labels) => Take::Exactly(labels.len()),
            },
            Modifier::FailTo { .. } => Take::Exactly(0),
            Modifier::FailNextTo { count, .. } => Take::Exactly(count.unwrap_or(1)),
        }
    }
}

/// Cursor over the declarations of one field and direction
#[derive(Debug)]
pub struct DeclarationQueue<'a> {
    declarations: &'a [Declaration],
    cursor: usize,
}

impl<'a> DeclarationQueue<'a> {
    pub fn new(declarations: &'a [Declaration]) -> Self {
        Self {
            declarations,
            cursor: 0,
        }
    }

    /// The declaration under the cursor
    pub fn current(&self) -> Option<&'a Declaration> {
        self.declarations.get(self.cursor)
    }

    pub fn advance(&mut self) {
        if self.cursor < self.declarations.len() {
            self.cursor += 1;
        }
    }

    /// Return the current declaration and move past it
    pub fn next_declaration(&mut self) -> Option<&'a Declaration> {
        let current = self.current()?;
        self.advance();
        Some(current)
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.declarations.len()
    }

    pub fn remaining(&self) -> usize {
        self.declarations.len() - self.cursor
    }

    pub fn position(&self) -> usize {
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_cursor() {
        let decls = vec![Declaration::named("Trim"), Declaration::named("ToFloat")];
        let mut queue = DeclarationQueue::new(&decls);
        assert_eq!(queue.remaining(), 2);
        assert_eq!(queue.current().map(|d| d.name()), Some("Trim".to_string()));

        queue.advance();
        assert_eq!(queue.position(), 1);
        assert_eq!(queue.next_declaration().map(|d| d.name()), Some("ToFloat".to_string()));
        assert!(queue.is_exhausted());

        queue.advance();
        assert_eq!(queue.position(), 2);
        assert!(queue.next_declaration().is_none());
    }

    #[test]
    fn test_default_takes() {
        assert_eq!(Modifier::Each { count: None }.take(), Take::All);
        assert_eq!(Modifier::Each { count: Some(2) }.take(), Take::Exactly(2));
        assert_eq!(
            Modifier::FailTo { fallback: Arg::Null, handler: None }.take(),
            Take::Exactly(0)
        );
        assert_eq!(
            Modifier::FailNextTo { fallback: Arg::Null, handler: None, count: None }.take(),
            Take::Exactly(1)
        );
        let labels = CollectShape::Labels(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(Modifier::Collect { shape: labels }.take(), Take::Exactly(3));
    }

    #[test]
    fn test_declaration_builder() {
        let decl = Declaration::named("Matches").construct_with(["^a"]).args([1, 2]);
        assert_eq!(decl.name(), "Matches");
        assert_eq!(decl.call_args.len(), 2);
        assert_eq!(decl.constructor_args.as_ref().map(Vec::len), Some(1));
        assert!(decl.as_modifier().is_none());

        let modifier: Declaration = Modifier::Any { count: Some(2) }.into();
        assert_eq!(modifier.name(), "Any");
    }
}
