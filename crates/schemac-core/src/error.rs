//! # Error Types — Compile Error Taxonomy
//!
//! Defines the errors raised while storing, resolving and compiling
//! schemas. All errors use `thiserror` for derive-based `Display` and
//! `Error` implementations.
//!
//! ## Design
//!
//! - Every variant carries the offending [`Location`] (or the identifier
//!   when no location exists yet), so a failure is attributable without
//!   re-deriving context.
//! - Extension failures also carry the vocabulary name.
//! - `CompileError` is `Clone`: the compiler caches failed locations and
//!   hands the same error to every later request for them.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::{Location, ResourceId};
use crate::pointer::{JsonPointer, PointerError};

/// A single located violation, flattened from a validation error tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// JSON Pointer to the violating value in the instance.
    pub instance_path: JsonPointer,
    /// Absolute location of the schema keyword that failed.
    pub schema_path: String,
    /// Human-readable description of the violation.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.instance_path.is_root() {
            write!(f, "  (root): {}", self.message)
        } else {
            write!(f, "  {}: {}", self.instance_path, self.message)
        }
    }
}

/// Renders a violation list one per line.
pub struct ViolationList<'a>(pub &'a [Violation]);

impl fmt::Display for ViolationList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

/// Which resource limit was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// Compile recursion depth.
    Depth,
    /// Compiled nodes per compiler.
    Nodes,
    /// `$ref` hops within one resolution.
    RefHops,
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Depth => "compile depth",
            Self::Nodes => "compiled node count",
            Self::RefHops => "reference hops",
        })
    }
}

/// Errors raised by the resource store, resolver and compiler.
#[derive(Error, Debug, Clone)]
pub enum CompileError {
    /// A resource with this identifier (or `$id` alias) already exists.
    #[error("resource '{id}' is already registered")]
    DuplicateResource {
        /// The clashing identifier.
        id: ResourceId,
    },

    /// The document could not be parsed or has an invalid shape.
    #[error("malformed document '{id}': {reason}")]
    MalformedDocument {
        /// Identifier the document was offered under.
        id: ResourceId,
        /// Why it was rejected.
        reason: String,
    },

    /// No resource is registered under the identifier.
    #[error("resource '{id}' not found")]
    ResourceNotFound {
        /// The missing identifier.
        id: ResourceId,
    },

    /// A reference string or pointer could not be parsed.
    #[error("invalid reference '{reference}': {source}")]
    InvalidReference {
        /// The reference text.
        reference: String,
        /// The pointer parse failure.
        #[source]
        source: PointerError,
    },

    /// A pointer segment or anchor does not exist in the document.
    #[error("cannot resolve '{reference}': {reason} (at {location})")]
    UnresolvableReference {
        /// The reference text being resolved.
        reference: String,
        /// The last location reached before the failure.
        location: Location,
        /// What was missing.
        reason: String,
    },

    /// A `$ref`/`$dynamicRef` target cannot be found.
    #[error("dangling reference '{reference}' at {location}: {reason}")]
    DanglingRef {
        /// The schema location holding the reference.
        location: Location,
        /// The reference text.
        reference: String,
        /// Why the target is missing.
        reason: String,
        /// Whether the target resource itself is missing (and might be added later).
        missing_resource: bool,
    },

    /// A cycle of in-place applicators with no descending step.
    #[error("cyclic schema without base case at {location}: {cycle}")]
    CyclicSchemaWithoutBase {
        /// First location on the cycle.
        location: Location,
        /// The cycle rendered as `a -> b -> a`.
        cycle: String,
    },

    /// The value at a schema location is neither an object nor a boolean.
    #[error("value at {location} is not a schema: found {found}")]
    NotASchema {
        /// The location that was expected to hold a schema.
        location: Location,
        /// JSON type of the value found there.
        found: String,
    },

    /// A keyword has an invalid value for the dialect.
    #[error("invalid keyword '{keyword}' at {location}: {reason}")]
    InvalidKeyword {
        /// Schema location holding the keyword.
        location: Location,
        /// The keyword name.
        keyword: String,
        /// Why it is invalid.
        reason: String,
    },

    /// The raw object at a location does not satisfy the vocabulary's
    /// meta-schema fragment.
    #[error(
        "meta-schema violation at {location} (vocabulary '{vocabulary}', meta-schema {meta_location}):\n{}",
        ViolationList(.violations)
    )]
    MetaSchemaViolation {
        /// The document location that was checked.
        location: Location,
        /// The vocabulary whose rule matched.
        vocabulary: String,
        /// The meta-schema fragment it was checked against.
        meta_location: Location,
        /// Individual violations.
        violations: Vec<Violation>,
    },

    /// A vocabulary compiler returned an error.
    #[error("vocabulary '{vocabulary}' failed to compile {location}: {reason}")]
    ExtensionCompileError {
        /// The document location being compiled.
        location: Location,
        /// The vocabulary name.
        vocabulary: String,
        /// The compiler's error message.
        reason: String,
    },

    /// A resource limit was exceeded.
    #[error("{limit} limit of {max} exceeded at {location}")]
    ResourceLimitExceeded {
        /// Location being compiled or resolved when the limit tripped.
        location: Location,
        /// Which limit.
        limit: Limit,
        /// The configured maximum.
        max: usize,
    },
}

impl CompileError {
    /// The location the error is attributed to, when it has one.
    pub fn location(&self) -> Option<&Location> {
        match self {
            Self::DuplicateResource { .. }
            | Self::MalformedDocument { .. }
            | Self::ResourceNotFound { .. }
            | Self::InvalidReference { .. } => None,
            Self::UnresolvableReference { location, .. }
            | Self::DanglingRef { location, .. }
            | Self::CyclicSchemaWithoutBase { location, .. }
            | Self::NotASchema { location, .. }
            | Self::InvalidKeyword { location, .. }
            | Self::MetaSchemaViolation { location, .. }
            | Self::ExtensionCompileError { location, .. }
            | Self::ResourceLimitExceeded { location, .. } => Some(location),
        }
    }

    /// Whether a location that failed with this error may be cached as
    /// `Failed`.
    ///
    /// Resource limits depend on the path the location was reached by, and
    /// a missing resource can be added later; neither is a property of the
    /// location itself.
    pub fn is_cacheable(&self) -> bool {
        match self {
            Self::ResourceLimitExceeded { .. } | Self::ResourceNotFound { .. } => false,
            Self::DanglingRef {
                missing_resource, ..
            } => !missing_resource,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(p: &str) -> Location {
        Location::new(ResourceId::new("spec.json"), JsonPointer::parse(p).unwrap())
    }

    #[test]
    fn violation_display_format() {
        let v = Violation {
            instance_path: JsonPointer::parse("/components/schemas/FooInvalid/type").unwrap(),
            schema_path: "meta.json#/$defs/schema/properties/type/anyOf".into(),
            message: "value does not match any subschema".into(),
        };
        let display = v.to_string();
        assert!(display.contains("/components/schemas/FooInvalid/type"));
        assert!(display.contains("does not match"));
    }

    #[test]
    fn violation_display_root() {
        let v = Violation {
            instance_path: JsonPointer::root(),
            schema_path: "/required".into(),
            message: "\"info\" is a required property".into(),
        };
        assert!(v.to_string().contains("(root)"));
    }

    #[test]
    fn meta_schema_violation_names_location_and_vocabulary() {
        let err = CompileError::MetaSchemaViolation {
            location: loc("/components/schemas/FooInvalid"),
            vocabulary: "openapi-3.1".into(),
            meta_location: loc("/$defs/schema"),
            violations: vec![Violation {
                instance_path: JsonPointer::parse("/type").unwrap(),
                schema_path: "x".into(),
                message: "bad type".into(),
            }],
        };
        let text = err.to_string();
        assert!(text.contains("spec.json#/components/schemas/FooInvalid"));
        assert!(text.contains("openapi-3.1"));
        assert!(text.contains("/type: bad type"));
        assert_eq!(err.location(), Some(&loc("/components/schemas/FooInvalid")));
    }

    #[test]
    fn cacheability() {
        let limit = CompileError::ResourceLimitExceeded {
            location: loc(""),
            limit: Limit::Depth,
            max: 4,
        };
        assert!(!limit.is_cacheable());

        let dangling_missing = CompileError::DanglingRef {
            location: loc(""),
            reference: "other.json".into(),
            reason: "resource not found".into(),
            missing_resource: true,
        };
        assert!(!dangling_missing.is_cacheable());

        let keyword = CompileError::InvalidKeyword {
            location: loc("/a"),
            keyword: "type".into(),
            reason: "unknown type".into(),
        };
        assert!(keyword.is_cacheable());
    }
}
