//! Fieldchain Core - pipeline compiler and executor for declarative field chains
//!
//! Each field of a record carries an ordered list of declarations: leaf
//! transformers, leaf validators and chain modifiers. This crate resolves those
//! declarations into cached nodes, composes them into one callable per field and
//! direction, and runs the callables with structured, path-annotated errors.
//!
//! # Main Components
//!
//! - **Resolution**: [`NodeResolver`] turns leaf declarations into cached leaves
//! - **Compilation**: [`ChainCompiler`] drains a declaration queue into a pipeline
//! - **Modifiers**: per-element, collect, first-success, assert-all, conditional,
//!   fail-to, template override and group scoping strategies
//! - **Processing**: [`Processor`] runs every field of a record under an [`ErrorMode`]
//!
//! # Example
//!
//! ```no_run
//! use fieldchain_core::{ChainCompiler, Declaration, Modifier, NodeCache, NodeRegistry, NodeResolver};
//! use std::sync::Arc;
//!
//! let resolver = NodeResolver::new(NodeCache::global())
//!     .with_factory(Arc::new(NodeRegistry::with_built_ins()));
//! let compiler = ChainCompiler::new(resolver);
//! let declarations = vec![
//!     Declaration::named("Split").args(["/"]),
//!     Modifier::Each { count: None }.into(),
//!     Declaration::named("ToFloat"),
//! ];
//! # let _ = (compiler, declarations);
//! ```

pub mod args;
pub mod built_in;
pub mod compiler;
pub mod declaration;
pub mod error;
pub mod node;
pub mod processor;
pub mod record;
pub mod resolver;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use args::{cache_key, Arg};
pub use compiler::ChainCompiler;
pub use declaration::{
    CollectShape, Declaration, DeclarationQueue, Failure, FailureFn, FailureHandler, Identity,
    Modifier, Take,
};
pub use error::{templates, Error, ProcessingError, Result};
pub use node::{Callable, Leaf, Node, Scope, Transform};
pub use processor::{ErrorMode, ProcessingOptions, ProcessingReport, Processor};
pub use record::{
    Direction, FieldDeclarations, MetadataProvider, MethodArity, MethodCall, Record,
    StaticMetadata,
};
pub use resolver::{
    CacheSnapshot, Fallback, FallbackResolver, NodeCache, NodeFactory, NodeRegistry, NodeResolver,
    ServiceLocator, ServiceRegistry,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
