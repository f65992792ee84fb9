// src/fingerprint/record.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{StorageFormat, TargetName};

/// Output hash of one dependency as seen by a dependent when it was built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyHash {
    pub name: TargetName,
    pub output_hash: String,
}

/// Everything that decides whether a target is up to date.
///
/// Equality is exact: any difference in any field means outdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintInputs {
    pub command_hash: String,
    /// Sorted by dependency name.
    pub deps: Vec<DependencyHash>,
    pub format: StorageFormat,
    pub seed: u64,
}

/// How the last evaluation of a target ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RecordStatus {
    /// Evaluated successfully.
    Ok,
    /// Evaluation failed and the error sentinel was stored instead. Counts as
    /// built; only re-attempted when the inputs change.
    Substituted { message: String },
    /// Evaluation failed under `fail-pipeline`. Re-attempted on the next run.
    Failed { message: String },
}

/// Persisted per-target fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    #[serde(flatten)]
    pub inputs: FingerprintInputs,
    /// Hash of the stored object (value bytes or tracked file contents).
    /// `None` only for targets that have never produced an object.
    pub output_hash: Option<String>,
    pub status: RecordStatus,
    pub recorded_at: DateTime<Utc>,
}

impl FingerprintRecord {
    pub fn new(inputs: FingerprintInputs, output_hash: Option<String>, status: RecordStatus) -> Self {
        Self {
            inputs,
            output_hash,
            status,
            recorded_at: Utc::now(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, RecordStatus::Failed { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            RecordStatus::Ok => None,
            RecordStatus::Substituted { message } | RecordStatus::Failed { message } => {
                Some(message)
            }
        }
    }

    /// The dependency hash this record expected for `dep`, if any.
    pub fn expected_dependency_hash(&self, dep: &str) -> Option<&str> {
        self.inputs
            .deps
            .iter()
            .find(|d| d.name == dep)
            .map(|d| d.output_hash.as_str())
    }
}
