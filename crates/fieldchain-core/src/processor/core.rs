//! The record processor
//!
//! Copyright (c) 2025 Fieldchain Team
//! Licensed under the Apache-2.0 license

use super::types::{ErrorMode, ProcessingOptions, ProcessingReport};
use crate::compiler::ChainCompiler;
use crate::error::{Error, Result};
use crate::node::{Callable, Scope};
use crate::record::{Direction, FieldDeclarations, MetadataProvider, Record};
use serde_json::Value;
use std::sync::Arc;

/// Runs the compiled pipeline of every filled field of a record
pub struct Processor {
    compiler: ChainCompiler,
    metadata: Arc<dyn MetadataProvider>,
    options: ProcessingOptions,
}

impl Processor {
    pub fn new(compiler: ChainCompiler, metadata: Arc<dyn MetadataProvider>) -> Self {
        Self {
            compiler,
            metadata,
            options: ProcessingOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ProcessingOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ProcessingOptions {
        &self.options
    }

    pub fn compiler(&self) -> &ChainCompiler {
        &self.compiler
    }

    /// The compiled pipeline for one field, memoized per record type, field,
    /// direction and active groups
    pub fn pipeline(
        &self,
        record: &dyn Record,
        field: &FieldDeclarations,
        direction: Direction,
    ) -> Result<Callable> {
        let key = pipeline_key(
            record.record_type(),
            &field.field,
            direction,
            record.active_groups(direction),
        );
        let cache = self.compiler.cache();
        if let Some(pipeline) = cache.pipeline(&key) {
            log::trace!("pipeline cache hit for `{}`", key);
            return Ok(pipeline);
        }
        let pipeline = self
            .compiler
            .compile_field(&field.declarations, record, direction)?;
        Ok(cache.store_pipeline(&key, pipeline))
    }

    /// Process every filled field of `record` in declaration order.
    ///
    /// Configuration errors always abort. Processing errors abort under
    /// [`ErrorMode::FailFast`] and are collected into the report otherwise.
    pub fn process(&self, record: &mut dyn Record, direction: Direction) -> Result<ProcessingReport> {
        let mode = self.options.error_mode;
        let span = tracing::debug_span!(
            "process_record",
            record_type = %record.record_type(),
            direction = %direction,
            mode = %mode,
        );
        let _enter = span.enter();

        let fields = self.metadata.field_declarations(record.record_type(), direction);
        let context = record.context();
        let mut report = ProcessingReport::default();

        for field in &fields {
            let name = field.field.as_str();
            if !record.is_filled(name) {
                continue;
            }
            let input = record.get(name).unwrap_or(Value::Null);
            let pipeline = self.pipeline(&*record, field, direction)?;

            let outcome = {
                let scope = Scope::new(&*record, direction)
                    .with_context(&context)
                    .with_trace(self.options.trace_paths);
                pipeline(input, &scope)
            };

            let mut err = match outcome {
                Ok(value) => {
                    record.set(name, value);
                    report.processed.push(name.to_string());
                    continue;
                }
                Err(Error::Processing(err)) => err,
                Err(other) => return Err(other),
            };
            err.property = Some(name.to_string());

            match mode {
                ErrorMode::FailFast => return Err(Error::Processing(err)),
                ErrorMode::CollectFailToInput => {}
                ErrorMode::CollectFailToNull => record.set(name, Value::Null),
                ErrorMode::CollectNone => {
                    record.set(name, Value::Null);
                    record.unfill(name);
                }
            }
            log::warn!("collected error for `{}.{}`: {}", record.record_type(), name, err);
            report.errors.push(*err);
        }

        tracing::debug!(
            processed = report.processed.len(),
            errors = report.errors.len(),
            "record processed"
        );
        Ok(report)
    }
}

fn pipeline_key(record_type: &str, field: &str, direction: Direction, mut groups: Vec<String>) -> String {
    groups.sort();
    groups.dedup();
    if groups.is_empty() {
        format!("{}.{}.{}", record_type, field, direction)
    } else {
        format!("{}.{}.{}|{}", record_type, field, direction, groups.join(","))
    }
}
