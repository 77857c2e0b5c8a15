//! Node resolution
//!
//! Turns a leaf declaration into a cached [`Leaf`](crate::node::Leaf). Strategies are
//! tried in a fixed order and the first match wins:
//!
//! 1. the declaration carries a ready-made node instance;
//! 2. the identity names a type known to the [`NodeFactory`];
//! 3. the identity names a method on the owning record (see
//!    [`method_name_for`](crate::record::method_name_for));
//! 4. the application's [`FallbackResolver`] recognizes it.
//!
//! Anything else is a configuration error.
//!
//! - [`core`] - the resolver itself
//! - [`registry`] - factory, service-locator and fallback collaborators
//! - [`cache`] - the process-wide memoization cache
//!
//! Copyright (c) 2025 Fieldchain Team
//! Licensed under the Apache-2.0 license

pub mod cache;
pub mod core;
pub mod registry;

#[cfg(test)]
mod tests;

pub use cache::{CacheEntrySnapshot, CacheSnapshot, NodeCache};
pub use core::{NodeResolver, Resolution};
pub use registry::{
    Fallback, FallbackResolver, NodeFactory, NodeRegistry, RawCallable, ServiceLocator,
    ServiceRegistry, TypeInfo,
};
