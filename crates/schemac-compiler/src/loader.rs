//! # Document Loading
//!
//! Parses JSON or YAML text into the `serde_json::Value` data model the
//! engine works on. The format is chosen explicitly or from the file
//! extension: `.yaml`/`.yml` are YAML, everything else is JSON.
//!
//! YAML has a richer type system than JSON (tags, non-string keys,
//! non-finite floats). Tags are dropped, scalar keys are stringified,
//! and anything without a JSON equivalent is rejected.

use std::path::Path;

use serde_json::{Map, Value};
use thiserror::Error;

use schemac_core::JsonPointer;

/// Source format of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    /// Pick the format from a file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Self::Yaml
            }
            _ => Self::Json,
        }
    }
}

/// Error loading a document.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The file could not be read.
    #[error("cannot read '{path}': {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The text is not valid JSON/YAML, or has no JSON equivalent.
    #[error("cannot parse '{name}': {reason}")]
    Parse {
        /// Name of the document (path or identifier).
        name: String,
        /// Parser message.
        reason: String,
    },
}

/// Parse document text in the given format.
pub fn parse_document(name: &str, text: &str, format: DocumentFormat) -> Result<Value, LoadError> {
    let parse_err = |reason: String| LoadError::Parse {
        name: name.to_string(),
        reason,
    };
    match format {
        DocumentFormat::Json => {
            serde_json::from_str(text).map_err(|e| parse_err(format!("invalid JSON: {e}")))
        }
        DocumentFormat::Yaml => {
            let yaml: serde_yaml::Value =
                serde_yaml::from_str(text).map_err(|e| parse_err(format!("invalid YAML: {e}")))?;
            yaml_to_json(&yaml).map_err(|e| parse_err(format!("YAML-to-JSON conversion failed: {e}")))
        }
    }
}

/// Read and parse a file, choosing the format from its extension.
pub fn read_document(path: &Path) -> Result<Value, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_document(&path.display().to_string(), &text, DocumentFormat::from_path(path))
}

/// Convert a YAML value into the JSON data model.
///
/// Scalar mapping keys are rendered as strings, so a response code written
/// `200:` becomes `"200"`. Keys that render to the same string are
/// rejected instead of silently merged. Errors name the pointer of the
/// offending position.
pub fn yaml_to_json(yaml: &serde_yaml::Value) -> Result<Value, String> {
    convert(yaml, &mut JsonPointer::root())
}

fn convert(yaml: &serde_yaml::Value, at: &mut JsonPointer) -> Result<Value, String> {
    use serde_yaml::Value as Yaml;

    Ok(match yaml {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(*b),
        Yaml::Number(n) => Value::Number(
            json_number(n).ok_or_else(|| format!("number {n} at '{at}' has no JSON representation"))?,
        ),
        Yaml::String(s) => Value::String(s.clone()),
        Yaml::Sequence(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                at.push(i.to_string());
                out.push(convert(item, at)?);
                at.pop();
            }
            Value::Array(out)
        }
        Yaml::Mapping(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, item) in map {
                let key = mapping_key(key).ok_or_else(|| format!("non-scalar mapping key at '{at}'"))?;
                if out.contains_key(&key) {
                    return Err(format!("key '{key}' appears twice at '{at}'"));
                }
                at.push(key.as_str());
                let value = convert(item, at)?;
                at.pop();
                out.insert(key, value);
            }
            Value::Object(out)
        }
        // Tags carry no meaning in the JSON data model.
        Yaml::Tagged(tagged) => convert(&tagged.value, at)?,
    })
}

fn json_number(n: &serde_yaml::Number) -> Option<serde_json::Number> {
    if let Some(i) = n.as_i64() {
        Some(i.into())
    } else if let Some(u) = n.as_u64() {
        Some(u.into())
    } else {
        n.as_f64().and_then(serde_json::Number::from_f64)
    }
}

fn mapping_key(key: &serde_yaml::Value) -> Option<String> {
    match key {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Null => Some("null".to_string()),
        serde_yaml::Value::Tagged(tagged) => mapping_key(&tagged.value),
        _ => None,
    }
}
