//! Record processing
//!
//! The processor asks the metadata provider for the declarations of every field,
//! fetches or compiles the field's pipeline, runs it, and applies the active
//! [`ErrorMode`] when it fails. Pipelines never recover on their own; the
//! processor is the only place that decides what a failure means for the record.
//!
//! Copyright (c) 2025 Fieldchain Team
//! Licensed under the Apache-2.0 license

pub mod core;
pub mod types;


pub use core::Processor;
pub use types::{ErrorMode, ProcessingOptions, ProcessingReport};
