//! Error taxonomy for the adaptation module.
//!
//! Configuration problems surface at construction and are fatal; step
//! failures surface from `generate` and are never retried internally.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::backend::ExecutionBackend;

/// Fatal construction-time errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "unknown execution backend {0:?} \
         (expected local-synchronous, accelerated-synchronous or distributed-async)"
    )]
    UnknownBackend(String),

    #[error("execution backend {backend} is unavailable in this build: {reason}")]
    BackendUnavailable {
        backend: ExecutionBackend,
        reason: &'static str,
    },

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error(
        "weight file {} holds a {rows}x{cols} snapshot, expected {expected_rows}x{expected_cols}",
        path.display()
    )]
    WeightShape {
        path: PathBuf,
        rows: usize,
        cols: usize,
        expected_rows: usize,
        expected_cols: usize,
    },

    #[error("failed to read weight file {}: {source}", path.display())]
    WeightFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read config file {}: {source}", path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to start the background engine: {0}")]
    EngineStart(#[source] io::Error),

    #[cfg(feature = "serde")]
    #[error("invalid config document: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by a constructed adaptation module.
#[derive(Debug, Error)]
pub enum AdaptError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// The engine failed to advance. The caller should fail safe (e.g. zero
    /// the corrective term) and stop using this module.
    #[error("adaptive engine step failed: {0}")]
    RuntimeStep(String),

    #[error("`{name}` has {actual} components, expected {expected}")]
    DimensionMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("adaptation module is stopped")]
    Stopped,

    #[error("checkpoint write failed for {}: {source}", path.display())]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
