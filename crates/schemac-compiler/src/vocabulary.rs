//! # Custom Vocabularies
//!
//! A vocabulary binds a named set of custom keywords to a meta-schema. It
//! consists of:
//!
//! - a [`VocabularyCompiler`] that turns the raw object at a document
//!   location into an optional [`ExtensionValue`];
//! - an [`Applicability`] that says which document locations it applies
//!   to and which meta-schema fragment governs each of them.
//!
//! ## Extension Scoping
//!
//! The meta-schema fragment is chosen by the *structural position* of the
//! location being compiled. A rule `("/components/schemas/*",
//! "/properties/components/properties/schemas/additionalProperties")`
//! means a schema object found under `/components/schemas/<name>` is
//! checked against that fragment, never against the meta-schema root. A
//! location no rule matches receives no extension from the vocabulary.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use schemac_core::{Dialect, JsonPointer, Location, PointerError, ResourceId};

use crate::schema::CompiledSchema;

/// Error type returned by vocabulary code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What a vocabulary compiler sees about the location it compiles.
#[derive(Debug, Clone, Copy)]
pub struct CompileContext<'a> {
    /// The document location being compiled.
    pub location: &'a Location,
    /// Name of the vocabulary being run.
    pub vocabulary: &'a str,
    /// The meta-schema fragment the object was checked against.
    pub meta_location: &'a Location,
    /// Dialect of the document.
    pub dialect: &'a Dialect,
    /// Root of the document, for vocabularies that need document context.
    pub document: &'a Value,
}

/// Compiles the raw object at a document location into an extension.
pub trait VocabularyCompiler: Send + Sync {
    /// Return `Ok(None)` when the vocabulary has nothing to attach here.
    fn compile(
        &self,
        ctx: &CompileContext<'_>,
        schema: &Map<String, Value>,
    ) -> Result<Option<Arc<dyn ExtensionValue>>, BoxError>;
}

impl<F> VocabularyCompiler for F
where
    F: Fn(&CompileContext<'_>, &Map<String, Value>) -> Result<Option<Arc<dyn ExtensionValue>>, BoxError>
        + Send
        + Sync,
{
    fn compile(
        &self,
        ctx: &CompileContext<'_>,
        schema: &Map<String, Value>,
    ) -> Result<Option<Arc<dyn ExtensionValue>>, BoxError> {
        self(ctx, schema)
    }
}

/// What an extension sees while validating.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    /// Pointer to the instance value being validated.
    pub instance_path: &'a JsonPointer,
    /// Schema location the extension is attached to.
    pub location: &'a Location,
}

/// The compiled form of a custom keyword set at one location.
pub trait ExtensionValue: Send + Sync + fmt::Debug {
    /// Validate an instance. An error becomes a located validation error.
    fn validate(&self, ctx: &ValidationContext<'_>, instance: &Value) -> Result<(), BoxError>;
}

/// An extension attached to a compiled node.
#[derive(Debug, Clone)]
pub struct Extension {
    /// Name of the vocabulary that produced it.
    pub vocabulary: Arc<str>,
    /// The compiled value.
    pub value: Arc<dyn ExtensionValue>,
}

/// A document pointer pattern. `*` matches exactly one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerPattern(Vec<Option<String>>);

impl PointerPattern {
    /// Parse a pattern such as `/paths/*/*/requestBody/content/*/schema`.
    pub fn parse(pattern: &str) -> Result<Self, PointerError> {
        let pointer = JsonPointer::parse(pattern)?;
        Ok(Self(
            pointer
                .tokens()
                .iter()
                .map(|t| if t == "*" { None } else { Some(t.clone()) })
                .collect(),
        ))
    }

    /// Whether the pattern matches `pointer` exactly.
    pub fn matches(&self, pointer: &JsonPointer) -> bool {
        self.0.len() == pointer.len()
            && self
                .0
                .iter()
                .zip(pointer.tokens())
                .all(|(segment, token)| segment.as_deref().map_or(true, |s| s == token))
    }
}

impl fmt::Display for PointerPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.0 {
            match segment {
                Some(s) => write!(f, "/{}", schemac_core::pointer::escape_token(s))?,
                None => f.write_str("/*")?,
            }
        }
        Ok(())
    }
}

/// One structural rule: document locations matching `pattern` are
/// governed by the meta-schema fragment at `meta_pointer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicabilityRule {
    pub pattern: PointerPattern,
    pub meta_pointer: JsonPointer,
}

/// Document-level condition, evaluated once per resource against its root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentCondition {
    /// Every document.
    Always,
    /// Documents whose root object has this key.
    HasKey(String),
    /// Documents whose root has a string member `key` starting with `prefix`.
    KeyPrefix { key: String, prefix: String },
}

impl DocumentCondition {
    /// Evaluate against a document root.
    pub fn holds(&self, root: &Value) -> bool {
        match self {
            Self::Always => true,
            Self::HasKey(key) => root.get(key.as_str()).is_some(),
            Self::KeyPrefix { key, prefix } => root
                .get(key.as_str())
                .and_then(Value::as_str)
                .is_some_and(|v| v.starts_with(prefix.as_str())),
        }
    }
}

/// Where a vocabulary applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applicability {
    pub condition: DocumentCondition,
    pub rules: Vec<ApplicabilityRule>,
}

impl Applicability {
    /// Start an applicability with no rules.
    pub fn new(condition: DocumentCondition) -> Self {
        Self {
            condition,
            rules: Vec::new(),
        }
    }

    /// Add a rule. Earlier rules take precedence.
    pub fn rule(mut self, pattern: &str, meta_pointer: &str) -> Result<Self, PointerError> {
        self.rules.push(ApplicabilityRule {
            pattern: PointerPattern::parse(pattern)?,
            meta_pointer: JsonPointer::parse(meta_pointer)?,
        });
        Ok(self)
    }

    /// Index of the first rule matching `pointer`.
    pub fn matching(&self, pointer: &JsonPointer) -> Option<usize> {
        self.rules.iter().position(|r| r.pattern.matches(pointer))
    }
}

/// A registered vocabulary.
pub(crate) struct Vocabulary {
    pub(crate) name: Arc<str>,
    pub(crate) compiler: Arc<dyn VocabularyCompiler>,
    pub(crate) applicability: Applicability,
    /// Per rule: the declared fragment location and its compiled schema.
    pub(crate) fragments: Vec<(Location, CompiledSchema)>,
}

impl fmt::Debug for Vocabulary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vocabulary")
            .field("name", &self.name)
            .field("applicability", &self.applicability)
            .field("fragments", &self.fragments.len())
            .finish()
    }
}

/// Vocabularies in registration order, plus the per-resource condition cache.
#[derive(Debug, Default)]
pub(crate) struct VocabularyRegistry {
    vocabularies: Vec<Vocabulary>,
    conditions: HashMap<(Arc<str>, ResourceId), bool>,
}

impl VocabularyRegistry {
    /// Register a vocabulary. A vocabulary with the same name is replaced
    /// in place, keeping its position in the order.
    pub(crate) fn register(&mut self, vocabulary: Vocabulary) {
        self.conditions.retain(|(name, _), _| *name != vocabulary.name);
        match self.vocabularies.iter_mut().find(|v| v.name == vocabulary.name) {
            Some(existing) => *existing = vocabulary,
            None => self.vocabularies.push(vocabulary),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.vocabularies.len()
    }

    pub(crate) fn get(&self, index: usize) -> Option<&Vocabulary> {
        self.vocabularies.get(index)
    }

    /// `(vocabulary index, rule index)` for every vocabulary applying at
    /// `location`, in registration order.
    pub(crate) fn applicable(&mut self, location: &Location, document: &Value) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        for (index, vocabulary) in self.vocabularies.iter().enumerate() {
            let Some(rule) = vocabulary.applicability.matching(&location.pointer) else {
                continue;
            };
            let holds = *self
                .conditions
                .entry((Arc::clone(&vocabulary.name), location.resource.clone()))
                .or_insert_with(|| vocabulary.applicability.condition.holds(document));
            if holds {
                out.push((index, rule));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ptr(p: &str) -> JsonPointer {
        JsonPointer::parse(p).unwrap()
    }

    #[test]
    fn wildcard_matches_exactly_one_segment() {
        let pattern = PointerPattern::parse("/components/schemas/*").unwrap();
        assert!(pattern.matches(&ptr("/components/schemas/Foo")));
        assert!(!pattern.matches(&ptr("/components/schemas")));
        assert!(!pattern.matches(&ptr("/components/schemas/Foo/properties")));
        assert!(!pattern.matches(&ptr("/components/other/Foo")));
        assert_eq!(pattern.to_string(), "/components/schemas/*");
    }

    #[test]
    fn empty_pattern_matches_root_only() {
        let pattern = PointerPattern::parse("").unwrap();
        assert!(pattern.matches(&JsonPointer::root()));
        assert!(!pattern.matches(&ptr("/info")));
    }

    #[test]
    fn first_matching_rule_wins() {
        let app = Applicability::new(DocumentCondition::Always)
            .rule("/a/*", "/first")
            .unwrap()
            .rule("/a/b", "/second")
            .unwrap();
        assert_eq!(app.matching(&ptr("/a/b")), Some(0));
        assert_eq!(app.matching(&ptr("/c")), None);
    }

    #[test]
    fn document_conditions() {
        let doc = json!({"openapi": "3.1.0"});
        assert!(DocumentCondition::Always.holds(&json!(true)));
        assert!(DocumentCondition::HasKey("openapi".into()).holds(&doc));
        assert!(!DocumentCondition::HasKey("swagger".into()).holds(&doc));
        let prefix = |p: &str| DocumentCondition::KeyPrefix {
            key: "openapi".into(),
            prefix: p.into(),
        };
        assert!(prefix("3.1").holds(&doc));
        assert!(!prefix("3.0").holds(&doc));
        assert!(!prefix("3.1").holds(&json!({"openapi": 3.1})));
    }

    #[test]
    fn invalid_rule_pointer_is_rejected() {
        assert!(Applicability::new(DocumentCondition::Always).rule("no-slash", "").is_err());
    }
}
