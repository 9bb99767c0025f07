//! # schemac-compiler: Scoped Schema Compilation
//!
//! Compiles JSON Schema references (drafts 4 through 2020-12) into frozen
//! validator graphs, with pluggable vocabularies whose meta-schema checks
//! are scoped by the structural position of each compiled location.
//!
//! ## Pipeline
//!
//! 1. [`ResourceStore`] holds parsed documents by identifier and indexes
//!    embedded `$id`s and anchors. Adding a document compiles nothing.
//! 2. [`Resolver`] turns a reference into a canonical [`Location`],
//!    hopping through `$ref` during pointer walks.
//! 3. [`Compiler`] compiles the closure of the requested location, running
//!    each applicable vocabulary against the meta-schema fragment chosen
//!    by that location's position, and freezes the result into a
//!    [`SchemaGraph`].
//! 4. [`CompiledSchema`] validates instances against the graph, producing
//!    a located error tree.
//!
//! ## OpenAPI
//!
//! The [`openapi`] module bundles an OpenAPI 3.1 meta-schema and the
//! vocabulary that applies it, so `spec.json#/components/schemas/Foo`
//! compiles against the schema-object fragment instead of the whole
//! document meta-schema.
//!
//! ## Crate Policy
//!
//! - Depends only on `schemac-core` internally.
//! - No I/O outside [`loader`] and [`CompilerOptions::from_file`].
//! - Compiled graphs are immutable; the compiler itself locks one mutex.

pub mod compiler;
pub mod keywords;
pub mod loader;
pub mod openapi;
pub mod options;
pub mod output;
pub mod resolver;
pub mod schema;
pub mod store;
mod validator;
pub mod vocabulary;

pub use compiler::{CompileStats, Compiler};
pub use keywords::{JsonType, Keyword};
pub use loader::{DocumentFormat, LoadError};
pub use options::{CompilerOptions, ConfigError};
pub use output::{ValidationError, ValidationFailure, ValidationMode};
pub use resolver::Resolver;
pub use schema::{CompiledSchema, SchemaBody, SchemaGraph, SchemaNode};
pub use store::{Resource, ResourceStore};
pub use vocabulary::{
    Applicability, ApplicabilityRule, BoxError, CompileContext, DocumentCondition, Extension, ExtensionValue,
    PointerPattern, ValidationContext, VocabularyCompiler,
};

pub use schemac_core::{CompileError, Dialect, JsonPointer, Limit, Location, ResourceId, Violation};
