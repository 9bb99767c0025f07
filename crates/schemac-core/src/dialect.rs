//! # Dialect Detection
//!
//! Every stored resource records the dialect it was written in. The
//! dialect is detected once, from the document root, when the resource is
//! added:
//!
//! 1. A string `$schema` names a known JSON Schema draft.
//! 2. Otherwise a root `openapi: "3.1.x"` marks an OpenAPI 3.1 document.
//! 3. Anything else is `Unknown` (or `Unspecified` with no `$schema`).
//!
//! Unknown and unspecified dialects are evaluated with draft 2020-12
//! semantics. Only a handful of keyword rules differ between drafts; the
//! predicates on [`Dialect`] are the single place the compiler asks.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The JSON Schema dialect of a stored resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// `http://json-schema.org/draft-04/schema#`
    Draft4,
    /// `http://json-schema.org/draft-06/schema#`
    Draft6,
    /// `http://json-schema.org/draft-07/schema#`
    Draft7,
    /// `https://json-schema.org/draft/2019-09/schema`
    Draft201909,
    /// `https://json-schema.org/draft/2020-12/schema`
    Draft202012,
    /// An OpenAPI 3.1 document without its own `$schema`.
    OpenApi31,
    /// A `$schema` URI this crate does not recognize.
    Unknown(String),
    /// No `$schema` and no recognizable document marker.
    Unspecified,
}

impl Dialect {
    /// Detect the dialect of a document from its root value.
    pub fn detect(root: &Value) -> Self {
        let Some(map) = root.as_object() else {
            return Self::Unspecified;
        };
        if let Some(uri) = map.get("$schema").and_then(Value::as_str) {
            return Self::from_schema_uri(uri);
        }
        match map.get("openapi").and_then(Value::as_str) {
            Some(version) if version.starts_with("3.1") => Self::OpenApi31,
            _ => Self::Unspecified,
        }
    }

    /// Map a `$schema` URI to a dialect.
    pub fn from_schema_uri(uri: &str) -> Self {
        let normalized = uri.trim_end_matches('#').trim_end_matches('/');
        let normalized = normalized
            .strip_prefix("https://")
            .or_else(|| normalized.strip_prefix("http://"))
            .unwrap_or(normalized);
        match normalized {
            "json-schema.org/draft-04/schema" => Self::Draft4,
            "json-schema.org/draft-06/schema" => Self::Draft6,
            "json-schema.org/draft-07/schema" => Self::Draft7,
            "json-schema.org/draft/2019-09/schema" => Self::Draft201909,
            "json-schema.org/draft/2020-12/schema" => Self::Draft202012,
            _ => Self::Unknown(uri.to_string()),
        }
    }

    /// Short identifier used in logs and CLI output.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Draft4 => "draft-04",
            Self::Draft6 => "draft-06",
            Self::Draft7 => "draft-07",
            Self::Draft201909 => "2019-09",
            Self::Draft202012 => "2020-12",
            Self::OpenApi31 => "openapi-3.1",
            Self::Unknown(uri) => uri,
            Self::Unspecified => "unspecified",
        }
    }

    /// In draft-07 and earlier, keywords next to `$ref` are ignored.
    pub fn ref_overrides_siblings(&self) -> bool {
        matches!(self, Self::Draft4 | Self::Draft6 | Self::Draft7)
    }

    /// Draft-04 spells exclusive bounds as booleans next to
    /// `minimum`/`maximum`.
    pub fn boolean_exclusive_bounds(&self) -> bool {
        matches!(self, Self::Draft4)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_known_drafts() {
        let cases = [
            ("http://json-schema.org/draft-04/schema#", Dialect::Draft4),
            ("http://json-schema.org/draft-06/schema#", Dialect::Draft6),
            ("http://json-schema.org/draft-07/schema", Dialect::Draft7),
            ("https://json-schema.org/draft/2019-09/schema", Dialect::Draft201909),
            ("https://json-schema.org/draft/2020-12/schema", Dialect::Draft202012),
        ];
        for (uri, expected) in cases {
            assert_eq!(Dialect::detect(&json!({ "$schema": uri })), expected, "{uri}");
        }
    }

    #[test]
    fn detects_openapi_document() {
        assert_eq!(
            Dialect::detect(&json!({"openapi": "3.1.0", "info": {}})),
            Dialect::OpenApi31
        );
        assert_eq!(
            Dialect::detect(&json!({"openapi": "3.0.3"})),
            Dialect::Unspecified
        );
    }

    #[test]
    fn explicit_schema_wins_over_openapi_marker() {
        let doc = json!({
            "openapi": "3.1.0",
            "$schema": "https://spec.openapis.org/oas/3.1/dialect/base"
        });
        assert!(matches!(Dialect::detect(&doc), Dialect::Unknown(_)));
    }

    #[test]
    fn boolean_root_is_unspecified() {
        assert_eq!(Dialect::detect(&json!(true)), Dialect::Unspecified);
    }

    #[test]
    fn dialect_predicates() {
        assert!(Dialect::Draft7.ref_overrides_siblings());
        assert!(!Dialect::Draft202012.ref_overrides_siblings());
        assert!(!Dialect::OpenApi31.ref_overrides_siblings());
        assert!(Dialect::Draft4.boolean_exclusive_bounds());
        assert!(!Dialect::Draft6.boolean_exclusive_bounds());
    }
}
