//! Compiler configuration.
//!
//! Bounds the work a single [`Compiler`](crate::Compiler) may do on a
//! pathological reference graph, and picks the default validation mode.
//! Defaults suit interactive use. Override via environment variables,
//! a YAML/JSON config file, or explicit construction.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::loader::{self, LoadError};
use crate::output::ValidationMode;

/// Configuration for a [`Compiler`](crate::Compiler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerOptions {
    /// Maximum compile recursion depth. Default: 128.
    pub max_depth: usize,
    /// Maximum number of nodes one compiler may compile. Default: 100 000.
    pub max_nodes: usize,
    /// Maximum `$ref` hops followed in one resolution. Default: 64.
    pub max_ref_hops: usize,
    /// Reject cycles made only of in-place applicators. Default: false.
    pub reject_unguarded_cycles: bool,
    /// Mode used by [`CompiledSchema::validate`](crate::CompiledSchema::validate).
    pub default_mode: ValidationMode,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            max_depth: 128,
            max_nodes: 100_000,
            max_ref_hops: 64,
            reject_unguarded_cycles: false,
            default_mode: ValidationMode::CollectAll,
        }
    }
}

impl CompilerOptions {
    /// Load options from environment variables, falling back to defaults.
    ///
    /// Variables:
    /// - `SCHEMAC_MAX_DEPTH` (default: 128)
    /// - `SCHEMAC_MAX_NODES` (default: 100000)
    /// - `SCHEMAC_MAX_REF_HOPS` (default: 64)
    /// - `SCHEMAC_REJECT_UNGUARDED_CYCLES` (default: false)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let options = Self {
            max_depth: env_usize("SCHEMAC_MAX_DEPTH", defaults.max_depth)?,
            max_nodes: env_usize("SCHEMAC_MAX_NODES", defaults.max_nodes)?,
            max_ref_hops: env_usize("SCHEMAC_MAX_REF_HOPS", defaults.max_ref_hops)?,
            reject_unguarded_cycles: env_bool(
                "SCHEMAC_REJECT_UNGUARDED_CYCLES",
                defaults.reject_unguarded_cycles,
            )?,
            default_mode: defaults.default_mode,
        };
        options.validate()?;
        Ok(options)
    }

    /// Load options from a YAML or JSON file. Missing fields take their
    /// defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let value = loader::read_document(path)?;
        let options: Self = serde_json::from_value(value).map_err(|e| ConfigError::Invalid {
            source_name: path.display().to_string(),
            reason: e.to_string(),
        })?;
        options.validate()?;
        Ok(options)
    }

    /// Reject limits that would make every compile fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("max_depth", self.max_depth),
            ("max_nodes", self.max_nodes),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    source_name: name.to_string(),
                    reason: "must be greater than 0".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn env_usize(var: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            source_name: var.to_string(),
            reason: format!("expected a non-negative integer, got '{raw}'"),
        }),
        Err(_) => Ok(default),
    }
}

fn env_bool(var: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                source_name: var.to_string(),
                reason: format!("expected a boolean, got '{raw}'"),
            }),
        },
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration value for {source_name}: {reason}")]
    Invalid { source_name: String, reason: String },
    #[error(transparent)]
    Load(#[from] LoadError),
}
