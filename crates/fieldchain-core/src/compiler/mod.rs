//! Pipeline compilation
//!
//! Turns the ordered declarations of one field into one callable. Leaves are
//! resolved through the [`NodeResolver`](crate::resolver::NodeResolver); chain
//! modifiers swallow sibling declarations and install one of the strategies in
//! [`modifiers`] in place of the default left-to-right fold.
//!
//! - [`chain`] - the compiler and its queue handling
//! - [`modifiers`] - composition strategies for each modifier family
//!
//! Copyright (c) 2025 Fieldchain Team
//! Licensed under the Apache-2.0 license

pub mod chain;
pub mod modifiers;


pub use chain::ChainCompiler;
pub use modifiers::{
    truthy, AllOf, Collect, Conditional, Each, FirstSuccess, Recover, TemplateOverride,
};
