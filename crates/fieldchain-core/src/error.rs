//! Error types for the fieldchain core library
//!
//! Two kinds of failure travel through a pipeline. Configuration errors are raised
//! while a chain is compiled (unresolvable declarations, wrong counts, missing
//! constructor arguments) and always propagate to the caller. Processing errors are
//! raised by a node at run time; they are enriched on the way out and handed to the
//! record processor, which applies the active [`ErrorMode`](crate::ErrorMode).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Message template identifiers raised by the core itself
pub mod templates {
    /// Every strategy of a first-success group failed
    pub const ANY_FAILED: &str = "chain.any_failed";
    /// A per-element group received a value that is not a collection
    pub const NOT_ITERABLE: &str = "chain.each.not_iterable";
}

/// Main error type for fieldchain operations
#[derive(Error, Debug)]
pub enum Error {
    /// A declaration could not be turned into a node. Always fatal.
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// A node rejected a value at run time
    #[error(transparent)]
    Processing(Box<ProcessingError>),

    /// JSON parsing and serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// Generic internal error with context
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build a configuration error without an underlying cause
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Whether this error is a compile-time configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration { .. })
    }

    /// Borrow the processing error, if this is one
    pub fn as_processing(&self) -> Option<&ProcessingError> {
        match self {
            Error::Processing(err) => Some(err),
            _ => None,
        }
    }

    /// Apply `f` to the processing error, leaving other kinds untouched
    pub(crate) fn map_processing(self, f: impl FnOnce(&mut ProcessingError)) -> Self {
        match self {
            Error::Processing(mut err) => {
                f(&mut err);
                Error::Processing(err)
            }
            other => other,
        }
    }
}

/// A run-time rejection raised by a node
///
/// The origin slot and path are filled in by the first enclosing node that sees the
/// error; nodes further out never overwrite them.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error(
    "Processing failed: {template}{}",
    details(.params, .property, .origin, .indices, .path)
)]
pub struct ProcessingError {
    /// Message template identifier, e.g. `"to_float.invalid"`
    pub template: String,
    /// Template parameters
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    /// Optional payload for debugging
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<Value>,
    /// Diagnostic name of the innermost node that raised or caught the error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Node names active when the failure occurred (only when path tracing is on)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
    /// Element positions, outermost first, for failures inside per-element groups
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indices: Vec<usize>,
    /// The record property being processed, set by the processor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(skip)]
    template_overridden: bool,
}

impl ProcessingError {
    /// Create an error for the given template
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            params: BTreeMap::new(),
            debug: None,
            origin: None,
            path: None,
            indices: Vec::new(),
            property: None,
            template_overridden: false,
        }
    }

    /// Attach a template parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Attach a debug payload
    pub fn with_debug(mut self, debug: impl Into<Value>) -> Self {
        self.debug = Some(debug.into());
        self
    }

    /// Build the aggregate raised when every first-success strategy failed
    pub fn aggregate(attempts: usize, failures: &[ProcessingError]) -> Self {
        let failed: Vec<Value> = failures
            .iter()
            .map(|f| Value::String(f.template.clone()))
            .collect();
        Self::new(templates::ANY_FAILED)
            .with_param("attempts", attempts)
            .with_param("failed", failed)
    }

    /// Set the origin node name unless a nested node already did.
    /// Returns whether the slot was filled by this call.
    pub fn set_origin_if_absent(&mut self, name: &str) -> bool {
        if self.origin.is_some() {
            return false;
        }
        self.origin = Some(name.to_string());
        true
    }

    /// Record the active node path unless one was already captured
    pub fn set_path_if_absent(&mut self, path: Vec<String>) {
        if self.path.is_none() {
            self.path = Some(path);
        }
    }

    /// Prepend an element position (called while unwinding out of nested groups)
    pub fn prepend_index(&mut self, index: usize) {
        self.indices.insert(0, index);
    }

    /// Whether an error-template override already rewrote this error
    pub fn is_template_overridden(&self) -> bool {
        self.template_overridden
    }

    pub(crate) fn override_template(&mut self, template: &str) {
        self.template = template.to_string();
        self.template_overridden = true;
    }

    /// Fetch a parameter by name
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

/// Everything after the template in a processing error's message
fn details(
    params: &BTreeMap<String, Value>,
    property: &Option<String>,
    origin: &Option<String>,
    indices: &[usize],
    path: &Option<Vec<String>>,
) -> String {
    let mut out = String::new();
    if !params.is_empty() {
        let rendered: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        out.push_str(&format!(" ({})", rendered.join(", ")));
    }
    if let Some(property) = property {
        out.push_str(&format!(" in property `{}`", property));
    }
    if let Some(origin) = origin {
        out.push_str(&format!(" at node {}", origin));
    }
    if !indices.is_empty() {
        let rendered: Vec<String> = indices.iter().map(|i| format!("[{}]", i)).collect();
        out.push_str(&format!(" element {}", rendered.join("")));
    }
    if let Some(path) = path {
        out.push_str(&format!(" via {}", path.join(" > ")));
    }
    out
}

impl From<ProcessingError> for Error {
    fn from(err: ProcessingError) -> Self {
        Error::Processing(Box::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal {
            message: err.to_string(),
            source: err,
        }
    }
}

/// Short lowercase name for the JSON kind of a value, used in error parameters
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
