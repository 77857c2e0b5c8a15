//! Executable nodes
//!
//! A node is either a [`Leaf`] wrapping one resolved transform, or a [`Composite`]
//! holding child nodes and a [`Compose`] strategy that decides how they are wired
//! together. Compiling a node yields a [`Callable`].
//!
//! - [`types`] - nodes, scope, the transform capability and default composition
//! - [`trace`] - the thread-local path-trace stack and the leaf invocation wrapper
//!
//! Copyright (c) 2025 Fieldchain Team
//! Licensed under the Apache-2.0 license

pub mod types;
pub mod trace;

pub use types::{
    chain, from_fn, identity, Callable, Composite, Compose, DependencySlot, Leaf, Node, Pipe, Scope,
    Transform,
};
pub use trace::{instrument, snapshot, TraceGuard};
