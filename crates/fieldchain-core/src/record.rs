//! Collaborator interfaces: the owning record and field metadata
//!
//! The core never inspects a record's fields directly. It asks the record for values,
//! methods and active groups through [`Record`], and asks a [`MetadataProvider`] for the
//! ordered declarations of each field.
//!
//! Copyright (c) 2025 Fieldchain Team
//! Licensed under the Apache-2.0 license

use crate::args::Arg;
use crate::declaration::Declaration;
use crate::error::{Error, ProcessingError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Processing direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Input into the record
    Inbound,
    /// Output out of the record
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

/// What a record method expects besides the value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodArity {
    /// Just the value and call arguments
    Value,
    /// The value, call arguments and the processing context
    ValueContext,
}

/// A call forwarded to a record method
#[derive(Debug)]
pub struct MethodCall<'a> {
    pub value: Value,
    pub args: &'a [Arg],
    /// Present when the method's arity asks for it
    pub context: Option<&'a Value>,
    /// Present when the method is invoked as a failure handler
    pub failure: Option<&'a ProcessingError>,
}

/// The record a pipeline runs for
pub trait Record {
    /// Stable name of the record type, used in cache keys
    fn record_type(&self) -> &str;

    /// Arity of a record method, or `None` if there is no such method
    fn method_arity(&self, _method: &str) -> Option<MethodArity> {
        None
    }

    /// Invoke a record method
    fn call_method(&self, method: &str, _call: MethodCall<'_>) -> Result<Value> {
        Err(Error::configuration(format!(
            "record `{}` has no method `{}`",
            self.record_type(),
            method
        )))
    }

    /// Groups currently active for the given direction
    fn active_groups(&self, _direction: Direction) -> Vec<String> {
        Vec::new()
    }

    /// Processing context shared by all fields
    fn context(&self) -> Value {
        Value::Null
    }

    fn get(&self, field: &str) -> Option<Value>;

    fn set(&mut self, field: &str, value: Value);

    /// Whether the field was supplied
    fn is_filled(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Mark the field as never supplied
    fn unfill(&mut self, field: &str);
}

/// The ordered declarations of one field
#[derive(Debug, Clone)]
pub struct FieldDeclarations {
    pub field: String,
    pub declarations: Vec<Declaration>,
}

/// Enumerates field declarations for a record type and direction
pub trait MetadataProvider: Send + Sync {
    fn field_declarations(&self, record_type: &str, direction: Direction) -> Vec<FieldDeclarations>;
}

/// In-memory metadata, filled with a builder
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata {
    entries: HashMap<(String, Direction), Vec<FieldDeclarations>>,
}

impl StaticMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field; fields keep the order they are added in
    pub fn field(
        mut self,
        record_type: impl Into<String>,
        direction: Direction,
        field: impl Into<String>,
        declarations: Vec<Declaration>,
    ) -> Self {
        let field = field.into();
        let fields = self.entries.entry((record_type.into(), direction)).or_default();
        fields.retain(|existing| existing.field != field);
        fields.push(FieldDeclarations {
            field,
            declarations,
        });
        self
    }
}

impl MetadataProvider for StaticMetadata {
    fn field_declarations(&self, record_type: &str, direction: Direction) -> Vec<FieldDeclarations> {
        self.entries
            .get(&(record_type.to_string(), direction))
            .cloned()
            .unwrap_or_default()
    }
}

/// Record method name a declared identity maps to: `NormalizeName` becomes `normalize_name`
pub fn method_name_for(identity: &str) -> String {
    let mut name = String::with_capacity(identity.len() + 4);
    let mut previous_lower = false;
    for ch in identity.chars() {
        if ch.is_uppercase() {
            if previous_lower {
                name.push('_');
            }
            name.extend(ch.to_lowercase());
            previous_lower = false;
        } else {
            previous_lower = ch.is_lowercase() || ch.is_ascii_digit();
            name.push(ch);
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_name_convention() {
        assert_eq!(method_name_for("NormalizeName"), "normalize_name");
        assert_eq!(method_name_for("trim"), "trim");
        assert_eq!(method_name_for("already_snake"), "already_snake");
        assert_eq!(method_name_for("ToISO"), "to_iso");
        assert_eq!(method_name_for("Parse2Int"), "parse2_int");
    }

    #[test]
    fn test_static_metadata_keeps_field_order() {
        let metadata = StaticMetadata::new()
            .field("Order", Direction::Inbound, "b", vec![Declaration::named("Trim")])
            .field("Order", Direction::Inbound, "a", vec![])
            .field("Order", Direction::Outbound, "c", vec![]);

        let inbound = metadata.field_declarations("Order", Direction::Inbound);
        let names: Vec<&str> = inbound.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(metadata.field_declarations("Order", Direction::Outbound).len(), 1);
        assert!(metadata.field_declarations("Missing", Direction::Inbound).is_empty());
    }

    #[test]
    fn test_direction_serde() {
        let json = serde_json::to_string(&Direction::Outbound).unwrap();
        assert_eq!(json, "\"outbound\"");
    }
}
