//! Processing options, recovery policy and run reports
//!
//! Copyright (c) 2025 Fieldchain Team
//! Licensed under the Apache-2.0 license

use crate::error::{Error, ProcessingError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What the processor does when a field's pipeline raises a processing error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMode {
    /// Abort the whole record on the first failure
    #[default]
    FailFast,
    /// Collect the error and keep the unprocessed input
    CollectFailToInput,
    /// Collect the error and set the field to null
    CollectFailToNull,
    /// Collect the error, null the field and mark it as never supplied
    CollectNone,
}

impl ErrorMode {
    /// Whether errors are collected instead of aborting the run
    pub fn collects(&self) -> bool {
        !matches!(self, ErrorMode::FailFast)
    }
}

impl fmt::Display for ErrorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorMode::FailFast => write!(f, "fail_fast"),
            ErrorMode::CollectFailToInput => write!(f, "collect_fail_to_input"),
            ErrorMode::CollectFailToNull => write!(f, "collect_fail_to_null"),
            ErrorMode::CollectNone => write!(f, "collect_none"),
        }
    }
}

impl FromStr for ErrorMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fail_fast" => Ok(ErrorMode::FailFast),
            "collect_fail_to_input" => Ok(ErrorMode::CollectFailToInput),
            "collect_fail_to_null" => Ok(ErrorMode::CollectFailToNull),
            "collect_none" => Ok(ErrorMode::CollectNone),
            other => Err(Error::configuration(format!("unknown error mode `{}`", other))),
        }
    }
}

/// Options for one processing run
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProcessingOptions {
    #[serde(default)]
    pub error_mode: ErrorMode,
    /// Record the active node path in processing errors
    #[serde(default)]
    pub trace_paths: bool,
}

impl ProcessingOptions {
    pub fn new(error_mode: ErrorMode) -> Self {
        Self {
            error_mode,
            trace_paths: false,
        }
    }

    pub fn with_trace_paths(mut self, enabled: bool) -> Self {
        self.trace_paths = enabled;
        self
    }

    /// Defaults overridden by `FIELDCHAIN_ERROR_MODE` and `FIELDCHAIN_TRACE_PATHS`
    pub fn from_env() -> Self {
        let mut options = Self::default();

        if let Ok(mode) = std::env::var("FIELDCHAIN_ERROR_MODE") {
            match mode.parse() {
                Ok(mode) => options.error_mode = mode,
                Err(err) => log::warn!("ignoring FIELDCHAIN_ERROR_MODE: {}", err),
            }
        }

        if let Ok(trace) = std::env::var("FIELDCHAIN_TRACE_PATHS") {
            options.trace_paths = trace == "1" || trace.to_lowercase() == "true";
        }

        options
    }
}

/// Outcome of processing one record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingReport {
    /// Errors collected under a collecting [`ErrorMode`], in field order
    pub errors: Vec<ProcessingError>,
    /// Fields whose pipeline succeeded, in field order
    pub processed: Vec<String>,
}

impl ProcessingReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// The collected error for `field`, if any
    pub fn error_for(&self, field: &str) -> Option<&ProcessingError> {
        self.errors
            .iter()
            .find(|err| err.property.as_deref() == Some(field))
    }
}
