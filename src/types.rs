// src/types.rs

//! Small shared vocabulary types used by config, graph, stores and engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical target name type used throughout the engine.
pub type TargetName = String;

/// How a target's result is persisted.
///
/// - `Memory`: the evaluator returns a value which is serialized into the
///   object store.
/// - `File`: the evaluator returns a path; the store only tracks the path and
///   a content hash of the file, the file itself stays where it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageFormat {
    Memory,
    File,
}

impl Default for StorageFormat {
    fn default() -> Self {
        StorageFormat::Memory
    }
}

impl FromStr for StorageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StorageFormat::Memory),
            "file" => Ok(StorageFormat::File),
            other => Err(format!(
                "invalid format: {other} (expected \"memory\" or \"file\")"
            )),
        }
    }
}

impl fmt::Display for StorageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageFormat::Memory => f.write_str("memory"),
            StorageFormat::File => f.write_str("file"),
        }
    }
}

/// What happens when a target's evaluation fails.
///
/// - `FailPipeline`: the target is marked errored and every transitive
///   dependent is skipped as `errored-upstream`. Independent branches keep
///   running.
/// - `SubstituteDefault`: the configured sentinel value is stored as the
///   target's output and dependents consume it as if it were a real result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    FailPipeline,
    SubstituteDefault,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        ErrorPolicy::FailPipeline
    }
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "fail-pipeline" => Ok(ErrorPolicy::FailPipeline),
            "substitute-default" => Ok(ErrorPolicy::SubstituteDefault),
            other => Err(format!(
                "invalid error policy: {other} (expected \"fail-pipeline\" or \"substitute-default\")"
            )),
        }
    }
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPolicy::FailPipeline => f.write_str("fail-pipeline"),
            ErrorPolicy::SubstituteDefault => f.write_str("substitute-default"),
        }
    }
}

/// Where fingerprint records and stored objects live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    /// One JSON file per target under the store directory.
    File,
    /// In memory only (lost when the process exits).
    Memory,
}

impl Default for StoreMode {
    fn default() -> Self {
        StoreMode::File
    }
}
