//! # schemac-core — Foundational Types for the Schema Compiler
//!
//! This crate defines the vocabulary every other `schemac` crate speaks.
//! It depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **One canonical position type.** A [`Location`] is a registered
//!    [`ResourceId`] plus a parsed [`JsonPointer`]. Two locations compare
//!    equal only when they address the same value, which is what lets the
//!    compiler use them as cache keys.
//!
//! 2. **Pointers are parsed, not concatenated.** Pointers are stored as
//!    unescaped tokens; RFC 6901 escaping happens only at the display
//!    boundary.
//!
//! 3. **Located errors.** Every [`CompileError`] names the location (and
//!    vocabulary, for extension failures) that produced it.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `schemac-*` crates (this is the leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod dialect;
pub mod error;
pub mod identity;
pub mod pointer;

// Re-export primary types for ergonomic imports.
pub use dialect::Dialect;
pub use error::{CompileError, Limit, Violation, ViolationList};
pub use identity::{join_reference, strip_fragment, Fragment, Location, Reference, ResourceId};
pub use pointer::{JsonPointer, PointerError};
