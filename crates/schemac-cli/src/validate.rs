//! # Validate Subcommand
//!
//! Validates JSON or YAML instance files against a compiled reference.
//! Prints one line per instance, followed by its violations, and exits
//! with 1 when any instance is invalid.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;

use schemac_compiler::loader;
use schemac_compiler::{CompiledSchema, ValidationFailure, ValidationMode};

use crate::compile::compile;
use crate::resources::{build_compiler, ResourceOpts};

/// Arguments for the validate subcommand.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub resources: ResourceOpts,

    /// Reference of the schema to validate against.
    #[arg(long)]
    pub schema: String,

    /// Report every violation instead of stopping at the first one.
    #[arg(long)]
    pub collect_all: bool,

    /// Print violations as JSON.
    #[arg(long)]
    pub json: bool,

    /// Instance files (JSON or YAML, by extension).
    #[arg(required = true)]
    pub instances: Vec<PathBuf>,
}

/// Outcome of validating one instance file.
#[derive(Debug)]
pub struct InstanceReport {
    pub path: PathBuf,
    pub failure: Option<ValidationFailure>,
}

impl InstanceReport {
    pub fn is_valid(&self) -> bool {
        self.failure.is_none()
    }
}

/// Execute the validate subcommand.
pub fn run_validate(args: &ValidateArgs, config: Option<&Path>) -> Result<u8> {
    let compiler = build_compiler(config, &args.resources)?;
    let schema = compile(&compiler, &args.schema)?;
    let mode = if args.collect_all {
        ValidationMode::CollectAll
    } else {
        ValidationMode::FailFast
    };

    let mut invalid = 0usize;
    for path in &args.instances {
        let report = validate_file(&schema, path, mode)?;
        match &report.failure {
            None => println!("{}: ok", path.display()),
            Some(failure) => {
                invalid += 1;
                if args.json {
                    let rendered = serde_json::to_string_pretty(&failure.violations())
                        .context("failed to render violations")?;
                    println!("{}: invalid\n{rendered}", path.display());
                } else {
                    println!("{}: {failure}", path.display());
                }
            }
        }
    }

    tracing::info!(
        schema = %schema.location(),
        instances = args.instances.len(),
        invalid,
        "validation finished"
    );
    Ok(if invalid == 0 { 0 } else { 1 })
}

/// Load one instance file and validate it.
pub fn validate_file(schema: &CompiledSchema, path: &Path, mode: ValidationMode) -> Result<InstanceReport> {
    let instance: Value = loader::read_document(path)
        .with_context(|| format!("failed to load instance {}", path.display()))?;
    Ok(InstanceReport {
        path: path.to_path_buf(),
        failure: schema.validate_with(&instance, mode).err(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ResourceArg;

    fn setup(dir: &Path) -> ResourceOpts {
        let schema = dir.join("order.json");
        std::fs::write(
            &schema,
            r#"{"type": "object", "required": ["id", "qty"],
                "properties": {"id": {"type": "string"}, "qty": {"type": "integer", "minimum": 1}}}"#,
        )
        .unwrap();
        ResourceOpts {
            resources: vec![ResourceArg {
                path: schema,
                id: Some("order.json".into()),
            }],
            openapi: false,
        }
    }

    fn args(resources: ResourceOpts, instances: Vec<PathBuf>, collect_all: bool) -> ValidateArgs {
        ValidateArgs {
            resources,
            schema: "order.json".into(),
            collect_all,
            json: false,
            instances,
        }
    }

    #[test]
    fn valid_instances_exit_zero() {
        let dir = tempfile::tempdir().unwrap();
        let resources = setup(dir.path());
        let good = dir.path().join("good.yaml");
        std::fs::write(&good, "id: A-1\nqty: 2\n").unwrap();
        assert_eq!(run_validate(&args(resources, vec![good], false), None).unwrap(), 0);
    }

    #[test]
    fn invalid_instance_exits_one() {
        let dir = tempfile::tempdir().unwrap();
        let resources = setup(dir.path());
        let good = dir.path().join("good.json");
        let bad = dir.path().join("bad.json");
        std::fs::write(&good, r#"{"id": "A", "qty": 1}"#).unwrap();
        std::fs::write(&bad, r#"{"id": 7, "qty": 0}"#).unwrap();
        assert_eq!(run_validate(&args(resources, vec![good, bad], true), None).unwrap(), 1);
    }

    #[test]
    fn modes_control_violation_count() {
        let dir = tempfile::tempdir().unwrap();
        let resources = setup(dir.path());
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, r#"{"id": 7, "qty": 0}"#).unwrap();

        let compiler = build_compiler(None, &resources).unwrap();
        let schema = compile(&compiler, "order.json").unwrap();

        let all = validate_file(&schema, &bad, ValidationMode::CollectAll).unwrap();
        assert_eq!(all.failure.unwrap().violations().len(), 2);

        let first = validate_file(&schema, &bad, ValidationMode::FailFast).unwrap();
        assert!(!first.is_valid());
        assert_eq!(first.failure.unwrap().violations().len(), 1);
    }

    #[test]
    fn unreadable_instance_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let resources = setup(dir.path());
        let missing = dir.path().join("missing.json");
        let err = run_validate(&args(resources, vec![missing], false), None).unwrap_err();
        assert!(format!("{err:#}").contains("failed to load instance"));
    }
}
