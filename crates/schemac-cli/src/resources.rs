//! Loading resources and building the compiler shared by every subcommand.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Args;

use schemac_compiler::{openapi, Compiler, CompilerOptions};

/// A resource file, optionally registered under an explicit identifier.
///
/// Written `PATH` or `PATH=ID`. Without `ID` the path itself is the
/// identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceArg {
    pub path: PathBuf,
    pub id: Option<String>,
}

impl ResourceArg {
    /// Identifier the resource is registered under.
    pub fn identifier(&self) -> String {
        self.id.clone().unwrap_or_else(|| self.path.display().to_string())
    }
}

impl FromStr for ResourceArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, id) = match s.split_once('=') {
            Some((path, id)) => (path, Some(id)),
            None => (s, None),
        };
        if path.is_empty() {
            return Err(format!("missing path in resource '{s}'"));
        }
        if id.is_some_and(str::is_empty) {
            return Err(format!("empty identifier in resource '{s}'"));
        }
        Ok(Self {
            path: PathBuf::from(path),
            id: id.map(str::to_string),
        })
    }
}

impl fmt::Display for ResourceArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}={id}", self.path.display()),
            None => write!(f, "{}", self.path.display()),
        }
    }
}

/// Options shared by `compile` and `validate`.
#[derive(Args, Debug, Clone, Default)]
pub struct ResourceOpts {
    /// Resource document to load, as PATH or PATH=ID. Repeatable.
    #[arg(short, long = "resource", value_name = "PATH[=ID]")]
    pub resources: Vec<ResourceArg>,

    /// Register the bundled OpenAPI 3.1 vocabulary.
    #[arg(long)]
    pub openapi: bool,
}

/// Load compiler options from `config`, or from `SCHEMAC_*` variables.
pub fn load_options(config: Option<&Path>) -> Result<CompilerOptions> {
    match config {
        Some(path) => CompilerOptions::from_file(path)
            .with_context(|| format!("failed to load compiler config {}", path.display())),
        None => CompilerOptions::from_env().context("invalid SCHEMAC_* environment configuration"),
    }
}

/// Build a compiler with the vocabularies and resources named on the
/// command line.
pub fn build_compiler(config: Option<&Path>, opts: &ResourceOpts) -> Result<Compiler> {
    let compiler = Compiler::with_options(load_options(config)?);

    if opts.openapi {
        openapi::register(&compiler).context("failed to register the OpenAPI 3.1 vocabulary")?;
    }

    for resource in &opts.resources {
        let id = resource.identifier();
        compiler
            .add_resource_file_as(&resource.path, &id)
            .with_context(|| format!("failed to load resource {resource}"))?;
        tracing::debug!(path = %resource.path.display(), id, "resource loaded");
    }
    Ok(compiler)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_path_only() {
        let arg: ResourceArg = "schemas/a.json".parse().unwrap();
        assert_eq!(arg.path, PathBuf::from("schemas/a.json"));
        assert_eq!(arg.identifier(), "schemas/a.json");
    }

    #[test]
    fn parse_path_with_identifier() {
        let arg: ResourceArg = "a.yaml=https://example.com/a.json".parse().unwrap();
        assert_eq!(arg.path, PathBuf::from("a.yaml"));
        assert_eq!(arg.identifier(), "https://example.com/a.json");
        assert_eq!(arg.to_string(), "a.yaml=https://example.com/a.json");
    }

    #[test]
    fn parse_rejects_empty_parts() {
        assert!("=id".parse::<ResourceArg>().is_err());
        assert!("a.json=".parse::<ResourceArg>().is_err());
    }

    #[test]
    fn build_compiler_loads_resources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.yaml");
        std::fs::write(&path, "type: string\n").unwrap();

        let opts = ResourceOpts {
            resources: vec![ResourceArg {
                path: path.clone(),
                id: Some("s.json".into()),
            }],
            openapi: true,
        };
        let compiler = build_compiler(None, &opts).unwrap();
        assert_eq!(compiler.vocabulary_count(), 1);
        assert!(compiler.compile("s.json").is_ok());
    }

    #[test]
    fn build_compiler_reports_missing_file() {
        let opts = ResourceOpts {
            resources: vec!["/nonexistent/schemac/x.json".parse().unwrap()],
            openapi: false,
        };
        let err = build_compiler(None, &opts).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/schemac/x.json"));
    }

    #[test]
    fn config_file_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schemac.yaml");
        std::fs::write(&path, "max_ref_hops: 3\n").unwrap();
        let options = load_options(Some(&path)).unwrap();
        assert_eq!(options.max_ref_hops, 3);
    }
}
