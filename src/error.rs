//! Error types

use std::path::PathBuf;
use thiserror::Error;

/// Opaque error returned by a database driver
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Job file problems
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("[{section}]: unknown key `{key}`")]
    UnknownKey { section: String, key: String },

    #[error("[{section}]: invalid value `{value}` for `{key}`: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("job `{job}`: {reason}")]
    InvalidJob { job: String, reason: String },

    #[error("duplicate section [{0}]")]
    DuplicateSection(String),

    #[error("no jobs defined")]
    NoJobs,

    #[error("invalid duration `{0}`")]
    Duration(String),

    #[error("unknown database flavor `{0}`")]
    UnknownFlavor(String),

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Benchmark run failures
#[derive(Debug, Error)]
pub enum BenchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("setup statement `{statement}` failed with code {code}: {source}")]
    Setup {
        statement: String,
        code: String,
        #[source]
        source: DriverError,
    },

    #[error("flavor `{0}` is not compiled in (enable the `{0}` cargo feature)")]
    FlavorUnavailable(String),

    #[error("failed to connect to {flavor} database: {source}")]
    Connect {
        flavor: String,
        #[source]
        source: DriverError,
    },
}

pub type Result<T, E = BenchError> = std::result::Result<T, E>;
