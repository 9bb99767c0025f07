//! # Compile Subcommand
//!
//! Compiles one reference and reports the frozen graph:
//!
//! ```text
//! $ schemac compile --openapi -r spec.json=valid-spec.json valid-spec.json
//! Compiled: valid-spec.json# (1 nodes) with extensions: 1
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use schemac_compiler::{CompiledSchema, Compiler};

use crate::resources::{build_compiler, ResourceOpts};

/// Arguments for the compile subcommand.
#[derive(Args, Debug)]
pub struct CompileArgs {
    #[command(flatten)]
    pub resources: ResourceOpts,

    /// Print every compiled node of the closure.
    #[arg(long)]
    pub nodes: bool,

    /// Reference to compile: ID, ID#/pointer or ID#anchor.
    pub reference: String,
}

/// Execute the compile subcommand.
pub fn run_compile(args: &CompileArgs, config: Option<&Path>) -> Result<u8> {
    let compiler = build_compiler(config, &args.resources)?;
    let schema = compile(&compiler, &args.reference)?;
    println!("{}", summary(&schema));
    if args.nodes {
        let graph = schema.graph();
        for index in 0..graph.len() {
            if let Some(node) = graph.node(index) {
                println!("  {} (extensions: {})", node.location, node.extensions.len());
            }
        }
    }
    Ok(0)
}

/// Compile `reference`, attaching it to any error.
pub fn compile(compiler: &Compiler, reference: &str) -> Result<CompiledSchema> {
    let schema = compiler
        .compile(reference)
        .with_context(|| format!("failed to compile '{reference}'"))?;
    tracing::info!(reference, nodes = schema.node_count(), "compiled");
    Ok(schema)
}

/// One-line report of a compiled schema.
pub fn summary(schema: &CompiledSchema) -> String {
    format!(
        "Compiled: {} ({} nodes) with extensions: {}",
        schema.location(),
        schema.node_count(),
        schema.extensions().len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ResourceArg;

    fn write(dir: &Path, name: &str, text: &str) -> ResourceArg {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        ResourceArg {
            path,
            id: Some(name.to_string()),
        }
    }

    #[test]
    fn compile_reports_location_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let resource = write(
            dir.path(),
            "person.json",
            r#"{"type": "object", "properties": {"name": {"type": "string"}}}"#,
        );
        let args = CompileArgs {
            resources: ResourceOpts {
                resources: vec![resource],
                openapi: false,
            },
            nodes: true,
            reference: "person.json".into(),
        };
        assert_eq!(run_compile(&args, None).unwrap(), 0);

        let compiler = build_compiler(None, &args.resources).unwrap();
        let schema = compile(&compiler, "person.json").unwrap();
        assert_eq!(summary(&schema), "Compiled: person.json# (2 nodes) with extensions: 0");
    }

    #[test]
    fn openapi_schema_object_gets_extension() {
        let dir = tempfile::tempdir().unwrap();
        let resource = write(
            dir.path(),
            "api.json",
            r#"{"openapi": "3.1.0", "info": {"title": "t", "version": "1"},
                "components": {"schemas": {"Foo": {"type": "string"}}}}"#,
        );
        let opts = ResourceOpts {
            resources: vec![resource],
            openapi: true,
        };
        let compiler = build_compiler(None, &opts).unwrap();
        let foo = compile(&compiler, "api.json#/components/schemas/Foo").unwrap();
        assert_eq!(foo.extensions().len(), 1);
        let root = compile(&compiler, "api.json").unwrap();
        assert!(summary(&root).ends_with("with extensions: 1"));
    }

    #[test]
    fn compile_error_names_reference() {
        let compiler = Compiler::new();
        let err = compile(&compiler, "missing.json").unwrap_err();
        let text = format!("{err:#}");
        assert!(text.contains("failed to compile 'missing.json'"));
        assert!(text.contains("not found"));
    }
}
