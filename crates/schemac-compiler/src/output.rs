//! # Validation Output
//!
//! A failed validation produces a tree of [`ValidationError`]s. Applicator
//! keywords (`allOf`, `properties`, `$ref`, ...) contribute an inner node
//! whose causes are the failures of their subschemas, so the tree follows
//! the shape of the instance and of the schema. [`ValidationFailure::violations`]
//! flattens it to the leaves for display.

use std::fmt;

use serde::{Deserialize, Serialize};

use schemac_core::{JsonPointer, Location, Violation, ViolationList};

/// How many failures a validation reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Report only the first failing path of the error tree.
    FailFast,
    /// Report every failure.
    #[default]
    CollectAll,
}

/// One node of the validation error tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    /// Pointer to the failing value in the instance.
    pub instance_path: JsonPointer,
    /// Keyword path from the root of the evaluated schema.
    pub keyword_path: JsonPointer,
    /// Absolute location of the schema node holding the keyword.
    pub schema_location: Location,
    /// The failing keyword, or the vocabulary name for extension failures.
    pub keyword: String,
    /// Human-readable description.
    pub message: String,
    /// Failures of subschemas that caused this one.
    pub causes: Vec<ValidationError>,
}

impl ValidationError {
    fn collect_leaves(&self, out: &mut Vec<Violation>) {
        if self.causes.is_empty() {
            out.push(Violation {
                instance_path: self.instance_path.clone(),
                schema_path: format!(
                    "{}/{}",
                    self.schema_location,
                    schemac_core::pointer::escape_token(&self.keyword)
                ),
                message: self.message.clone(),
            });
        } else {
            for cause in &self.causes {
                cause.collect_leaves(out);
            }
        }
    }

    fn first_path(mut self) -> Self {
        self.causes.truncate(1);
        self.causes = self.causes.into_iter().map(Self::first_path).collect();
        self
    }
}

/// A failed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationFailure {
    /// Top-level errors of the evaluated schema.
    pub errors: Vec<ValidationError>,
}

impl ValidationFailure {
    pub(crate) fn new(errors: Vec<ValidationError>, mode: ValidationMode) -> Self {
        match mode {
            ValidationMode::CollectAll => Self { errors },
            ValidationMode::FailFast => Self {
                errors: errors.into_iter().take(1).map(ValidationError::first_path).collect(),
            },
        }
    }

    /// The leaves of the error tree, in evaluation order.
    pub fn violations(&self) -> Vec<Violation> {
        let mut out = Vec::new();
        for error in &self.errors {
            error.collect_leaves(&mut out);
        }
        out
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let violations = self.violations();
        write!(f, "validation failed with {} violation(s):", violations.len())?;
        if !violations.is_empty() {
            write!(f, "\n{}", ViolationList(&violations))?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationFailure {}
