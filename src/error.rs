//! Top-level error taxonomy: one variant family per pipeline stage, unified
//! under [`RepairError`], following the same per-module error enum pattern
//! used elsewhere in this crate (`EditError`, `SafetyError`,
//! `ApplicationError`) with `thiserror`-derived `Display`/`source()`.

use std::path::PathBuf;
use thiserror::Error;

/// Malformed candidate-locations/profile input.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("failed to parse JSON from {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An unsatisfiable type coercion in [`crate::typing::correct_types`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("no legal coercion from {from:?} to {to:?} for expression `{repr}`")]
    NoCoercion {
        from: crate::model::Type,
        to: crate::model::Type,
        repr: String,
    },
    #[error("operator {operator:?} expects {expected} argument(s), found {found}")]
    ArityMismatch {
        operator: crate::model::Operator,
        expected: usize,
        found: usize,
    },
}

/// Runtime or project compilation failed, or a required artifact is
/// missing.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("compilation of {artifact} failed (exit status: {status:?})")]
    NonZeroExit {
        artifact: String,
        status: Option<i32>,
    },
    #[error("failed to spawn compiler for {artifact}: {source}")]
    Spawn {
        artifact: String,
        #[source]
        source: std::io::Error,
    },
    #[error("required artifact missing: {path}")]
    MissingArtifact { path: PathBuf },
}

/// The test driver is missing, not executable, or otherwise unusable.
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("test driver {path} does not exist or is not executable")]
    DriverNotOk { path: PathBuf },
    #[error("failed to spawn test driver for test '{test}': {source}")]
    Spawn {
        test: String,
        #[source]
        source: std::io::Error,
    },
}

/// The unified top-level error surfaced to the CLI; any unhandled error maps
/// to `RepairStatus::Error` at the orchestration boundary.
#[derive(Error, Debug)]
pub enum RepairError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}
