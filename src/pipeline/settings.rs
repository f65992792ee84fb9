// src/pipeline/settings.rs

use std::time::Duration;

use crate::pipeline::Target;
use crate::types::{ErrorPolicy, StorageFormat};

/// Pipeline-wide defaults and runtime knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub default_error_policy: ErrorPolicy,
    pub default_format: StorageFormat,
    /// Maximum number of targets evaluated at the same time. Always >= 1.
    pub worker_concurrency: usize,
    /// Sentinel stored for targets whose evaluation failed under
    /// [`ErrorPolicy::SubstituteDefault`].
    pub default_value_on_error: serde_json::Value,
    /// Timeout applied to targets that do not set their own.
    pub target_timeout: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_error_policy: ErrorPolicy::default(),
            default_format: StorageFormat::default(),
            worker_concurrency: default_worker_concurrency(),
            default_value_on_error: serde_json::Value::Null,
            target_timeout: None,
        }
    }
}

impl Settings {
    pub fn format_of(&self, target: &Target) -> StorageFormat {
        target.format.unwrap_or(self.default_format)
    }

    pub fn policy_of(&self, target: &Target) -> ErrorPolicy {
        target.error_policy.unwrap_or(self.default_error_policy)
    }

    pub fn timeout_of(&self, target: &Target) -> Option<Duration> {
        target.timeout.or(self.target_timeout)
    }
}

pub fn default_worker_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
