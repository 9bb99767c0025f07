//! # schemac-cli: Schema Compiler Command Line
//!
//! Thin front end over `schemac-compiler`.
//!
//! ## Subcommands
//!
//! - `compile` — compile a reference and report the frozen graph
//! - `validate` — validate JSON/YAML instance files against a reference
//!
//! Both take `--resource PATH[=ID]` (repeatable) to load documents and
//! `--openapi` to register the bundled OpenAPI 3.1 vocabulary.
//!
//! ## Crate Policy
//!
//! - Argument parsing lives in `main.rs`; handlers return an exit code.
//! - Engine errors are wrapped with `anyhow` context, never re-typed.

pub mod compile;
pub mod resources;
pub mod validate;
