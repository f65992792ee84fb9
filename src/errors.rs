// src/errors.rs

//! Crate-wide error type and result alias.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cycle detected in target graph: {}", .cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },

    #[error("Duplicate target name: {0}")]
    DuplicateName(String),

    #[error(
        "Invalid target name '{0}' (expected [A-Za-z_][A-Za-z0-9_]*, not a reserved environment variable)"
    )]
    InvalidName(String),

    #[error("Target '{target}' depends on undeclared target '{dependency}'")]
    UnknownDependency { target: String, dependency: String },

    #[error("Target '{target}' failed: {message}")]
    Evaluator { target: String, message: String },

    #[error("Target '{target}' reported file {path:?} which does not exist")]
    FileTracking { target: String, path: PathBuf },

    #[error("Target '{target}' timed out after {after:?}")]
    Timeout { target: String, after: Duration },

    #[error("Storage error for '{target}': {message}")]
    StorageIo { target: String, message: String },

    #[error("No stored result for target: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// Errors raised while producing a target's value. These are subject to
    /// the target's error policy; everything else fails the target outright.
    pub fn is_evaluation_failure(&self) -> bool {
        matches!(
            self,
            PipelineError::Evaluator { .. }
                | PipelineError::FileTracking { .. }
                | PipelineError::Timeout { .. }
        )
    }

    pub(crate) fn storage(target: &str, err: impl std::fmt::Display) -> Self {
        PipelineError::StorageIo {
            target: target.to_string(),
            message: err.to_string(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PipelineError>;
