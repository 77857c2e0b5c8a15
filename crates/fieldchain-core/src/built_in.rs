//! Built-in leaf nodes for common string and number handling
//!
//! These cover the usual first steps of an inbound pipeline (trimming, splitting,
//! parsing) and a couple of validators. Register them all with
//! [`NodeRegistry::with_built_ins`].
//!
//! Copyright (c) 2025 Fieldchain Team
//! Licensed under the Apache-2.0 license

use crate::args::Arg;
use crate::error::{value_kind, ProcessingError, Result};
use crate::node::{Scope, Transform};
use crate::resolver::NodeRegistry;
use anyhow::anyhow;
use regex::Regex;
use serde_json::{Number, Value};

/// Template raised when a string node receives anything else
pub const STRING_EXPECTED: &str = "string.expected";

fn expect_str<'v>(value: &'v Value, node: &str) -> Result<&'v str> {
    value.as_str().ok_or_else(|| {
        ProcessingError::new(STRING_EXPECTED)
            .with_param("node", node)
            .with_param("type", value_kind(value))
            .into()
    })
}

/// Strip characters from both ends. The first call argument lists the characters;
/// without one, whitespace is stripped.
#[derive(Debug, Default)]
pub struct Trim;

impl Transform for Trim {
    fn transform(&self, value: Value, args: &[Arg], _scope: &Scope<'_>) -> Result<Value> {
        let text = expect_str(&value, "Trim")?;
        let trimmed = match args.first().and_then(Arg::as_str) {
            Some(chars) => text.trim_matches(|c: char| chars.contains(c)),
            None => text.trim(),
        };
        Ok(Value::String(trimmed.to_string()))
    }
}

/// Split a string on the separator given as first call argument
#[derive(Debug, Default)]
pub struct Split;

impl Transform for Split {
    fn transform(&self, value: Value, args: &[Arg], _scope: &Scope<'_>) -> Result<Value> {
        let text = expect_str(&value, "Split")?;
        let separator = args.first().and_then(Arg::as_str).unwrap_or(",");
        Ok(Value::Array(
            text.split(separator)
                .map(|part| Value::String(part.to_string()))
                .collect(),
        ))
    }
}

/// Parse a string into a float; numbers pass through
#[derive(Debug, Default)]
pub struct ToFloat;

impl ToFloat {
    pub const INVALID: &'static str = "to_float.invalid";
}

impl Transform for ToFloat {
    fn transform(&self, value: Value, _args: &[Arg], _scope: &Scope<'_>) -> Result<Value> {
        if value.is_number() {
            return Ok(value);
        }
        let parsed = value
            .as_str()
            .and_then(|text| text.trim().parse::<f64>().ok())
            .and_then(Number::from_f64);
        match parsed {
            Some(number) => Ok(Value::Number(number)),
            None => Err(ProcessingError::new(Self::INVALID).with_param("value", value).into()),
        }
    }
}

#[derive(Debug, Default)]
pub struct Uppercase;

impl Transform for Uppercase {
    fn transform(&self, value: Value, _args: &[Arg], _scope: &Scope<'_>) -> Result<Value> {
        Ok(Value::String(expect_str(&value, "Uppercase")?.to_uppercase()))
    }
}

/// Reject null, blank strings and empty collections
#[derive(Debug, Default)]
pub struct NotBlank;

impl NotBlank {
    pub const BLANK: &'static str = "not_blank";
}

impl Transform for NotBlank {
    fn transform(&self, value: Value, _args: &[Arg], _scope: &Scope<'_>) -> Result<Value> {
        let blank = match &value {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Object(entries) => entries.is_empty(),
            _ => false,
        };
        if blank {
            return Err(ProcessingError::new(Self::BLANK).into());
        }
        Ok(value)
    }
}

/// Reject strings that do not match the pattern given at construction
#[derive(Debug)]
pub struct Matches {
    pattern: Regex,
}

impl Matches {
    pub const NO_MATCH: &'static str = "matches.no_match";

    pub fn new(pattern: &str) -> anyhow::Result<Self> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    fn from_args(args: &[Arg]) -> anyhow::Result<Self> {
        let pattern = args
            .first()
            .and_then(Arg::as_str)
            .ok_or_else(|| anyhow!("expected a pattern string as first constructor argument"))?;
        Self::new(pattern)
    }
}

impl Transform for Matches {
    fn transform(&self, value: Value, _args: &[Arg], _scope: &Scope<'_>) -> Result<Value> {
        if !self.pattern.is_match(expect_str(&value, "Matches")?) {
            return Err(ProcessingError::new(Self::NO_MATCH)
                .with_param("pattern", self.pattern.as_str())
                .into());
        }
        Ok(value)
    }
}

/// Register every built-in node under its type name
pub fn register_all(registry: &mut NodeRegistry) {
    registry
        .register_default::<Trim>("Trim")
        .register_default::<Split>("Split")
        .register_default::<ToFloat>("ToFloat")
        .register_default::<Uppercase>("Uppercase")
        .register_default::<NotBlank>("NotBlank")
        .register_with_args("Matches", Matches::from_args);
}
