//! # attributes: metadata attached to a vector store file
//!
//! The vector store accepts a small flat map of metadata per file. This module owns the
//! constraints on that map, builds the default attributes for a local file, and merges
//! user-supplied attributes over those defaults.
//!
//! - [`parse_attributes`] turns raw CLI JSON into a validated [`Attributes`] map.
//! - [`validate_attributes`] checks any map against the service limits.
//! - [`default_attributes`] derives `source` and `upload_date` from the file on disk.
//! - [`merge_attributes`] overlays custom attributes on the defaults (custom wins).

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::UNIX_EPOCH;
use thiserror::Error;
use tracing::debug;

/// Maximum number of attribute keys allowed on one file.
pub const MAX_ATTRIBUTES: usize = 16;
/// Maximum length of an attribute key, in characters.
pub const MAX_KEY_LENGTH: usize = 64;
/// Maximum length of a string attribute value, in characters.
pub const MAX_VALUE_LENGTH: usize = 512;

/// Shown to the user whenever the attributes argument is not valid JSON.
pub const ATTRIBUTES_EXAMPLE: &str = r#"'{"key1": "value1", "key2": "value2"}'"#;

/// A single attribute value. The service accepts strings, booleans and numbers only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Bool(bool),
    Number(Number),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_owned())
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

/// Attribute map keyed by attribute name.
pub type Attributes = BTreeMap<String, AttributeValue>;

#[derive(Debug, Error)]
pub enum AttributeError {
    #[error("Invalid JSON format for attributes: {source}\nExample: {example}", example = ATTRIBUTES_EXAMPLE)]
    Malformed {
        #[source]
        source: serde_json::Error,
    },
    #[error("Attributes must be a valid JSON object.")]
    NotAnObject,
    #[error("Attributes must have a maximum of {max} keys, got {count}.", max = MAX_ATTRIBUTES)]
    TooManyKeys { count: usize },
    #[error("Key '{key}' must be a string between 1 and {max} characters.", max = MAX_KEY_LENGTH)]
    InvalidKey { key: String },
    #[error(
        "Value for '{key}' must be a string with a maximum length of {max} characters, got {length}.",
        max = MAX_VALUE_LENGTH
    )]
    ValueTooLong { key: String, length: usize },
    #[error("Value for '{key}' must be a string, boolean or number.")]
    UnsupportedValue { key: String },
}

/// Parses and validates the raw attributes argument.
pub fn parse_attributes(raw: &str) -> Result<Attributes, AttributeError> {
    let value: Value = serde_json::from_str(raw).map_err(|source| {
        debug!(error = %source, "Attributes argument is not valid JSON");
        AttributeError::Malformed { source }
    })?;

    let object = match value {
        Value::Object(object) => object,
        other => {
            debug!(kind = json_kind(&other), "Attributes argument is not a JSON object");
            return Err(AttributeError::NotAnObject);
        }
    };

    let mut attributes = Attributes::new();
    for (key, value) in object {
        let value = match value {
            Value::String(s) => AttributeValue::String(s),
            Value::Bool(b) => AttributeValue::Bool(b),
            Value::Number(n) => AttributeValue::Number(n),
            other => {
                debug!(key = %key, kind = json_kind(&other), "Unsupported attribute value type");
                return Err(AttributeError::UnsupportedValue { key });
            }
        };
        attributes.insert(key, value);
    }

    validate_attributes(&attributes)?;
    debug!(count = attributes.len(), "Custom attributes parsed");
    Ok(attributes)
}

/// Checks an attribute map against the key count, key length and string value length limits.
pub fn validate_attributes(attributes: &Attributes) -> Result<(), AttributeError> {
    if attributes.len() > MAX_ATTRIBUTES {
        return Err(AttributeError::TooManyKeys {
            count: attributes.len(),
        });
    }
    for (key, value) in attributes {
        let key_length = key.chars().count();
        if key_length == 0 || key_length > MAX_KEY_LENGTH {
            return Err(AttributeError::InvalidKey { key: key.clone() });
        }
        // Booleans and numbers have no length limit.
        if let AttributeValue::String(s) = value {
            let length = s.chars().count();
            if length > MAX_VALUE_LENGTH {
                return Err(AttributeError::ValueTooLong {
                    key: key.clone(),
                    length,
                });
            }
        }
    }
    Ok(())
}

/// Default attributes for a file: its base name and its modification time in epoch seconds.
pub fn default_attributes(path: &Path) -> std::io::Result<Attributes> {
    let source = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let modified = std::fs::metadata(path)?.modified()?;
    let seconds = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    let upload_date = Number::from_f64(seconds).unwrap_or_else(|| Number::from(0));

    let mut attributes = Attributes::new();
    attributes.insert("source".to_owned(), AttributeValue::String(source));
    attributes.insert("upload_date".to_owned(), AttributeValue::Number(upload_date));
    Ok(attributes)
}

/// Overlays `custom` on `defaults`; custom values replace defaults with the same key.
pub fn merge_attributes(defaults: Attributes, custom: Attributes) -> Attributes {
    let mut merged = defaults;
    merged.extend(custom);
    merged
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
