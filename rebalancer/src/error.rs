//! Error types for the rebalancer.

use std::path::PathBuf;

/// All errors that can occur during rebalancer operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("request error: {0}")]
    Request(String),

    #[error("failed to read request file {path}: {source}")]
    RequestRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse request JSON: {0}")]
    RequestParse(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] driftwise::Error),

    #[error("no feasible plan: {0}")]
    Infeasible(String),

    #[error("failed to write plan {path}: {source}")]
    PlanWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("aborted: {0}")]
    Aborted(String),

    #[error("audit log error: {0}")]
    Audit(#[from] std::io::Error),
}

impl From<driftwise::OptimizationError> for Error {
    fn from(e: driftwise::OptimizationError) -> Self {
        Error::Core(e.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
