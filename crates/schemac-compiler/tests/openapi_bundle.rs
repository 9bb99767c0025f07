//! End-to-end compilation of OpenAPI 3.1 documents with the bundled
//! vocabulary, covering position-scoped meta-schema checks.

use std::path::PathBuf;

use serde_json::json;

use schemac_compiler::openapi::{self, VOCABULARY_NAME};
use schemac_compiler::{CompileError, Compiler};

fn testdata(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/testdata/openapi").join(name)
}

fn compiler_with_specs() -> Compiler {
    let compiler = Compiler::new();
    openapi::register(&compiler).unwrap();
    for name in ["valid-spec.json", "invalid-spec.json"] {
        compiler.add_resource_file_as(&testdata(name), name).unwrap();
    }
    compiler
}

#[test]
fn valid_document_root_gets_one_extension() {
    let compiler = compiler_with_specs();
    let root = compiler.compile("valid-spec.json").unwrap();
    assert_eq!(root.extensions().len(), 1);
    assert_eq!(&*root.extensions()[0].vocabulary, VOCABULARY_NAME);
    let debug = format!("{:?}", root.extensions()[0].value);
    assert!(debug.contains("3.1.0"), "{debug}");
}

#[test]
fn nested_schema_object_is_checked_against_its_fragment() {
    let compiler = compiler_with_specs();
    // Foo has no openapi/info members, which only the root fragment requires.
    let foo = compiler.compile("valid-spec.json#/components/schemas/Foo").unwrap();
    assert_eq!(foo.extensions().len(), 1);
    assert!(foo.is_valid(&json!({"id": 1, "name": "x"})));
    assert!(!foo.is_valid(&json!({"id": 0})));
    assert!(!foo.is_valid(&json!({"id": 1, "extra": true})));
}

#[test]
fn extensions_are_attached_only_where_a_rule_matches() {
    let compiler = compiler_with_specs();
    let foo = compiler.compile("valid-spec.json#/components/schemas/Foo").unwrap();
    let id = foo.child("properties/id").unwrap();
    assert!(id.extensions().is_empty());

    let info = compiler.compile("valid-spec.json#/info").unwrap();
    assert!(info.extensions().is_empty());
}

#[test]
fn operation_schemas_get_extensions() {
    let compiler = compiler_with_specs();
    let response = compiler
        .compile("valid-spec.json#/paths/~1foo/get/responses/200/content/application~1json/schema")
        .unwrap();
    assert_eq!(response.extensions().len(), 1);
    assert!(response.is_valid(&json!([{"id": 3}])));
    assert!(!response.is_valid(&json!([{"id": "3"}])));

    let parameter = compiler
        .compile("valid-spec.json#/paths/~1foo/get/parameters/0/schema")
        .unwrap();
    assert_eq!(parameter.extensions().len(), 1);
    assert!(!parameter.is_valid(&json!(101)));
}

#[test]
fn invalid_document_root_fails_meta_schema() {
    let compiler = compiler_with_specs();
    let err = compiler.compile("invalid-spec.json").unwrap_err();
    match err {
        CompileError::MetaSchemaViolation {
            location,
            vocabulary,
            meta_location,
            violations,
        } => {
            assert_eq!(location.to_string(), "invalid-spec.json#");
            assert_eq!(vocabulary, VOCABULARY_NAME);
            assert!(meta_location.pointer.is_root());
            assert!(violations
                .iter()
                .any(|v| v.instance_path.to_string() == "/components/schemas/FooInvalid/required"));
        }
        other => panic!("expected MetaSchemaViolation, got {other:?}"),
    }
}

#[test]
fn valid_sibling_in_invalid_document_compiles() {
    let compiler = compiler_with_specs();
    assert!(compiler.compile("invalid-spec.json").is_err());
    let foo = compiler.compile("invalid-spec.json#/components/schemas/Foo").unwrap();
    assert_eq!(foo.extensions().len(), 1);
    assert!(foo.is_valid(&json!({"id": 1})));
    assert!(!foo.is_valid(&json!({})));
}

#[test]
fn invalid_schema_object_fails_at_its_own_location() {
    let compiler = compiler_with_specs();
    let err = compiler
        .compile("invalid-spec.json#/components/schemas/FooInvalid")
        .unwrap_err();
    match &err {
        CompileError::InvalidKeyword { location, keyword, .. } => {
            assert_eq!(location.to_string(), "invalid-spec.json#/components/schemas/FooInvalid");
            assert_eq!(keyword, "required");
        }
        other => panic!("expected InvalidKeyword, got {other:?}"),
    }
    assert_eq!(err.location().map(ToString::to_string).as_deref(), Some("invalid-spec.json#/components/schemas/FooInvalid"));

    // The failure is cached and does not poison the sibling.
    assert!(compiler
        .compile("invalid-spec.json#/components/schemas/FooInvalid")
        .is_err());
    assert!(compiler.compile("invalid-spec.json#/components/schemas/Foo").is_ok());
}

#[test]
fn schema_object_fragment_violation_is_located() {
    let compiler = compiler_with_specs();
    compiler
        .add_resource(
            "pets.json",
            json!({
                "openapi": "3.1.0",
                "info": {"title": "pets", "version": "1"},
                "components": {"schemas": {
                    "Pet": {"type": "object", "discriminator": {"mapping": {}}},
                    "Tag": {"type": "string"}
                }}
            }),
        )
        .unwrap();

    let err = compiler.compile("pets.json#/components/schemas/Pet").unwrap_err();
    match &err {
        CompileError::MetaSchemaViolation {
            location,
            vocabulary,
            meta_location,
            violations,
        } => {
            assert_eq!(location.to_string(), "pets.json#/components/schemas/Pet");
            assert_eq!(vocabulary, VOCABULARY_NAME);
            assert_eq!(
                meta_location.to_string(),
                format!(
                    "{}#/properties/components/properties/schemas/additionalProperties",
                    openapi::OPENAPI_31_META_SCHEMA_ID
                )
            );
            assert!(violations.iter().any(|v| v.instance_path.to_string() == "/discriminator"));
        }
        other => panic!("expected MetaSchemaViolation, got {other:?}"),
    }
    assert!(err.to_string().contains("pets.json#/components/schemas/Pet"));
    assert!(compiler.compile("pets.json#/components/schemas/Tag").is_ok());
}

#[test]
fn discriminator_is_enforced_by_the_extension() {
    let compiler = compiler_with_specs();
    let pet = compiler.compile("valid-spec.json#/components/schemas/Pet").unwrap();
    assert!(pet.is_valid(&json!({"petType": "cat"})));

    let failure = pet.validate(&json!({"petType": "bird"})).unwrap_err();
    assert_eq!(failure.errors.len(), 1);
    assert_eq!(failure.errors[0].keyword, VOCABULARY_NAME);
    assert!(failure.errors[0].message.contains("bird"));

    // Through an allOf, the discriminator of the referenced schema applies.
    let cat = compiler.compile("valid-spec.json#/components/schemas/Cat").unwrap();
    assert!(cat.is_valid(&json!({"petType": "cat", "indoor": true})));
    assert!(!cat.is_valid(&json!({"indoor": true})));
}

#[test]
fn other_openapi_versions_are_out_of_scope() {
    let compiler = Compiler::new();
    openapi::register(&compiler).unwrap();
    compiler
        .add_resource(
            "legacy.json",
            json!({
                "openapi": "3.0.3",
                "components": {"schemas": {"Pet": {"type": "object", "discriminator": {}}}}
            }),
        )
        .unwrap();
    let pet = compiler.compile("legacy.json#/components/schemas/Pet").unwrap();
    assert!(pet.extensions().is_empty());
}

#[test]
fn bundle_registers_once_per_compiler() {
    let compiler = Compiler::new();
    openapi::register(&compiler).unwrap();
    assert_eq!(compiler.vocabulary_count(), 1);
    // The meta resource already exists, so a second bundle registration fails
    // at the store and leaves the registry untouched.
    assert!(matches!(
        openapi::register(&compiler),
        Err(CompileError::DuplicateResource { .. })
    ));
    assert_eq!(compiler.vocabulary_count(), 1);
}
