//! # OpenAPI 3.1 Vocabulary
//!
//! Bundled vocabulary that checks OpenAPI 3.1 documents against the OAS
//! meta-schema, scoped by structural position:
//!
//! | Document location | Meta-schema fragment |
//! |-------------------|----------------------|
//! | document root | meta-schema root |
//! | `/components/schemas/*` | `/properties/components/properties/schemas/additionalProperties` |
//! | parameter, request body and response schemas | the matching `schema` property |
//!
//! Compiling `spec.json#/components/schemas/Foo` therefore checks `Foo`
//! against the schema-object fragment only; problems elsewhere in the
//! document do not affect it.
//!
//! The compiled extension at the document root records the OpenAPI
//! version. Schema objects get an extension carrying their
//! `discriminator`, which validates the discriminating property of
//! instances.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use schemac_core::{CompileError, PointerError, ResourceId};

use crate::compiler::Compiler;
use crate::schema::CompiledSchema;
use crate::vocabulary::{
    Applicability, BoxError, CompileContext, DocumentCondition, ExtensionValue, ValidationContext,
    VocabularyCompiler,
};

/// Identifier of the bundled OpenAPI 3.1 meta-schema.
pub const OPENAPI_31_META_SCHEMA_ID: &str = "https://spec.openapis.org/oas/3.1/schema/2022-10-07";

/// Name the vocabulary is registered under.
pub const VOCABULARY_NAME: &str = "openapi-3.1";

const META_SCHEMA: &str = include_str!("../schemas/openapi-3.1.schema.json");

/// Fragment governing every schema object in a document.
const SCHEMA_OBJECT: &str = "/properties/components/properties/schemas/additionalProperties";
const MEDIA_TYPE_SCHEMA: &str = "/$defs/media-type/properties/schema";
const PARAMETER_SCHEMA: &str = "/$defs/parameter/properties/schema";

/// The structural rules of the vocabulary.
pub fn applicability() -> Result<Applicability, PointerError> {
    Applicability::new(DocumentCondition::KeyPrefix {
        key: "openapi".to_string(),
        prefix: "3.1".to_string(),
    })
    .rule("", "")?
    .rule("/components/schemas/*", SCHEMA_OBJECT)?
    .rule("/components/parameters/*/schema", PARAMETER_SCHEMA)?
    .rule("/components/requestBodies/*/content/*/schema", MEDIA_TYPE_SCHEMA)?
    .rule("/components/responses/*/content/*/schema", MEDIA_TYPE_SCHEMA)?
    .rule("/paths/*/parameters/*/schema", PARAMETER_SCHEMA)?
    .rule("/paths/*/*/parameters/*/schema", PARAMETER_SCHEMA)?
    .rule("/paths/*/*/requestBody/content/*/schema", MEDIA_TYPE_SCHEMA)?
    .rule("/paths/*/*/responses/*/content/*/schema", MEDIA_TYPE_SCHEMA)
}

/// The bundled meta-schema document.
pub fn meta_schema_document() -> Result<Value, CompileError> {
    serde_json::from_str(META_SCHEMA).map_err(|e| CompileError::MalformedDocument {
        id: ResourceId::new(OPENAPI_31_META_SCHEMA_ID),
        reason: e.to_string(),
    })
}

/// Add the bundled meta-schema to `compiler`, compile it and register the
/// vocabulary. Returns the compiled meta-schema.
pub fn register(compiler: &Compiler) -> Result<CompiledSchema, CompileError> {
    compiler.add_resource(OPENAPI_31_META_SCHEMA_ID, meta_schema_document()?)?;
    let meta = compiler.compile(OPENAPI_31_META_SCHEMA_ID)?;
    let applicability = applicability().map_err(|source| CompileError::InvalidReference {
        reference: OPENAPI_31_META_SCHEMA_ID.to_string(),
        source,
    })?;
    compiler.register_extension(VOCABULARY_NAME, &meta, OpenApiVocabulary, applicability)?;
    info!(meta_schema = OPENAPI_31_META_SCHEMA_ID, nodes = meta.node_count(), "OpenAPI 3.1 vocabulary ready");
    Ok(meta)
}

/// Compiles OpenAPI objects into extensions.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenApiVocabulary;

impl VocabularyCompiler for OpenApiVocabulary {
    fn compile(
        &self,
        ctx: &CompileContext<'_>,
        schema: &Map<String, Value>,
    ) -> Result<Option<Arc<dyn ExtensionValue>>, BoxError> {
        if ctx.location.pointer.is_root() {
            return Ok(schema
                .get("openapi")
                .and_then(Value::as_str)
                .map(|version| Arc::new(OpenApiDocument { version: version.to_string() }) as Arc<dyn ExtensionValue>));
        }
        let discriminator = match schema.get("discriminator") {
            Some(raw) => Some(Discriminator::deserialize(raw)?),
            None => None,
        };
        Ok(Some(Arc::new(SchemaObject { discriminator })))
    }
}

/// Extension attached to an OpenAPI document root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenApiDocument {
    /// The `openapi` version string.
    pub version: String,
}

impl ExtensionValue for OpenApiDocument {
    fn validate(&self, _ctx: &ValidationContext<'_>, _instance: &Value) -> Result<(), BoxError> {
        Ok(())
    }
}

/// `discriminator` of a schema object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discriminator {
    pub property_name: String,
    #[serde(default)]
    pub mapping: BTreeMap<String, String>,
}

/// Extension attached to a schema object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaObject {
    pub discriminator: Option<Discriminator>,
}

impl ExtensionValue for SchemaObject {
    fn validate(&self, _ctx: &ValidationContext<'_>, instance: &Value) -> Result<(), BoxError> {
        let (Some(discriminator), Value::Object(map)) = (&self.discriminator, instance) else {
            return Ok(());
        };
        let name = &discriminator.property_name;
        let value = match map.get(name) {
            Some(Value::String(value)) => value,
            Some(_) => return Err(format!("discriminator property \"{name}\" must be a string").into()),
            None => return Err(format!("discriminator property \"{name}\" is missing").into()),
        };
        if !discriminator.mapping.is_empty() && !discriminator.mapping.contains_key(value) {
            let known: Vec<&str> = discriminator.mapping.keys().map(String::as_str).collect();
            return Err(format!(
                "discriminator value \"{value}\" is not one of: {}",
                known.join(", ")
            )
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemac_core::{JsonPointer, Location};
    use serde_json::json;

    #[test]
    fn bundled_meta_schema_parses() {
        let doc = meta_schema_document().unwrap();
        assert_eq!(doc["$id"], json!(OPENAPI_31_META_SCHEMA_ID));
    }

    #[test]
    fn applicability_rules_match_schema_positions() {
        let app = applicability().unwrap();
        assert_eq!(app.rules.len(), 9);
        let at = |p: &str| app.matching(&JsonPointer::parse(p).unwrap());
        assert_eq!(at(""), Some(0));
        assert_eq!(at("/components/schemas/Foo"), Some(1));
        assert_eq!(at("/components/schemas/Foo/properties/id"), None);
        assert_eq!(at("/paths/~1pets/get/responses/200/content/application~1json/schema"), Some(8));
        assert!(app.condition.holds(&json!({"openapi": "3.1.0"})));
        assert!(!app.condition.holds(&json!({"openapi": "3.0.3"})));
    }

    #[test]
    fn discriminator_checks_property() {
        let ext = SchemaObject {
            discriminator: Some(Discriminator {
                property_name: "petType".into(),
                mapping: BTreeMap::from([("cat".to_string(), "#/components/schemas/Cat".to_string())]),
            }),
        };
        let path = JsonPointer::root();
        let location = Location::root(ResourceId::new("spec.json"));
        let ctx = ValidationContext {
            instance_path: &path,
            location: &location,
        };
        assert!(ext.validate(&ctx, &json!({"petType": "cat"})).is_ok());
        assert!(ext.validate(&ctx, &json!({"petType": "dog"})).is_err());
        assert!(ext.validate(&ctx, &json!({})).is_err());
        assert!(ext.validate(&ctx, &json!("not an object")).is_ok());

        let unmapped = SchemaObject {
            discriminator: Some(Discriminator {
                property_name: "kind".into(),
                mapping: BTreeMap::new(),
            }),
        };
        assert!(unmapped.validate(&ctx, &json!({"kind": "anything"})).is_ok());
    }
}
