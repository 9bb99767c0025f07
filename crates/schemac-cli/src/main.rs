//! # schemac CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use schemac_cli::compile::{run_compile, CompileArgs};
use schemac_cli::validate::{run_validate, ValidateArgs};

/// schemac: compile JSON Schema references and validate instances.
#[derive(Parser, Debug)]
#[command(name = "schemac", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Compiler options file (YAML or JSON). Defaults to SCHEMAC_* variables.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile a reference and report the frozen graph.
    Compile(CompileArgs),

    /// Validate instance files against a compiled reference.
    Validate(ValidateArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over -v when set.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();
    let result = match &cli.command {
        Commands::Compile(args) => run_compile(args, config),
        Commands::Validate(args) => run_validate(args, config),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parse_compile() {
        let cli = Cli::try_parse_from(["schemac", "compile", "spec.json#/components/schemas/Foo"]).unwrap();
        if let Commands::Compile(args) = cli.command {
            assert_eq!(args.reference, "spec.json#/components/schemas/Foo");
            assert!(args.resources.resources.is_empty());
            assert!(!args.resources.openapi);
        } else {
            panic!("expected compile");
        }
    }

    #[test]
    fn cli_parse_compile_with_resources() {
        let cli = Cli::try_parse_from([
            "schemac",
            "compile",
            "--openapi",
            "-r",
            "a.json",
            "--resource",
            "b.yaml=https://example.com/b.json",
            "a.json",
        ])
        .unwrap();
        if let Commands::Compile(args) = cli.command {
            assert!(args.resources.openapi);
            assert_eq!(args.resources.resources.len(), 2);
            assert_eq!(args.resources.resources[1].identifier(), "https://example.com/b.json");
        } else {
            panic!("expected compile");
        }
    }

    #[test]
    fn cli_parse_validate() {
        let cli = Cli::try_parse_from([
            "schemac",
            "validate",
            "--schema",
            "order.json",
            "--collect-all",
            "one.json",
            "two.yaml",
        ])
        .unwrap();
        if let Commands::Validate(args) = cli.command {
            assert_eq!(args.schema, "order.json");
            assert!(args.collect_all);
            assert_eq!(args.instances, vec![PathBuf::from("one.json"), PathBuf::from("two.yaml")]);
        } else {
            panic!("expected validate");
        }
    }

    #[test]
    fn cli_parse_validate_requires_schema_and_instances() {
        assert!(Cli::try_parse_from(["schemac", "validate", "one.json"]).is_err());
        assert!(Cli::try_parse_from(["schemac", "validate", "--schema", "s.json"]).is_err());
    }

    #[test]
    fn cli_parse_global_options() {
        let cli = Cli::try_parse_from(["schemac", "-vv", "--config", "schemac.yaml", "compile", "a.json"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("schemac.yaml")));
    }

    #[test]
    fn cli_parse_rejects_bad_resource() {
        assert!(Cli::try_parse_from(["schemac", "compile", "-r", "a.json=", "a.json"]).is_err());
    }

    #[test]
    fn cli_parse_no_subcommand_errors() {
        assert!(Cli::try_parse_from(["schemac"]).is_err());
    }
}
