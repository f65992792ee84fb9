// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::exec::DEFAULT_RENDER_TEMPLATE;
use crate::pipeline::Settings;
use crate::pipeline::settings::default_worker_concurrency;
use crate::store::DEFAULT_STORE_DIR;
use crate::types::{ErrorPolicy, StorageFormat, StoreMode};

/// Top-level pipeline file as read from TOML, before validation.
///
/// ```toml
/// [config]
/// default_format = "memory"
/// worker_concurrency = 4
///
/// [[target]]
/// name = "raw"
/// cmd = "echo data/a.csv"
/// format = "file"
///
/// [[target]]
/// name = "clean"
/// cmd = "tidy $raw"
/// ```
///
/// Targets are an array so declaration order is kept and duplicate names
/// can be reported.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPipelineFile {
    /// Pipeline-wide options from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// All `[[target]]` entries, in declaration order.
    #[serde(default)]
    pub target: Vec<TargetConfig>,
}

/// Validated pipeline file.
///
/// Obtain one with `PipelineFile::try_from(raw)`; every field has passed
/// the checks in [`validate`](super::validate).
#[derive(Debug, Clone)]
pub struct PipelineFile {
    pub config: ConfigSection,
    pub target: Vec<TargetConfig>,
    target_timeout: Option<Duration>,
    timeouts: Vec<Option<Duration>>,
}

impl PipelineFile {
    /// Construct from already-validated parts.
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        target: Vec<TargetConfig>,
        target_timeout: Option<Duration>,
        timeouts: Vec<Option<Duration>>,
    ) -> Self {
        Self {
            config,
            target,
            target_timeout,
            timeouts,
        }
    }

    /// Pipeline-wide settings.
    pub fn settings(&self) -> Settings {
        Settings {
            default_error_policy: self.config.default_error_policy,
            default_format: self.config.default_format,
            worker_concurrency: self
                .config
                .worker_concurrency
                .unwrap_or_else(default_worker_concurrency),
            default_value_on_error: self.config.default_value_on_error.clone(),
            target_timeout: self.target_timeout,
        }
    }

    /// Targets paired with their parsed timeout override.
    pub fn targets(&self) -> impl Iterator<Item = (&TargetConfig, Option<Duration>)> {
        self.target
            .iter()
            .zip(self.timeouts.iter().copied())
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// `"fail-pipeline"` (default) or `"substitute-default"`.
    #[serde(default)]
    pub default_error_policy: ErrorPolicy,

    /// `"memory"` (default) or `"file"`.
    #[serde(default)]
    pub default_format: StorageFormat,

    /// Maximum number of targets evaluated at once. Defaults to the number of
    /// available CPUs.
    #[serde(default)]
    pub worker_concurrency: Option<usize>,

    /// Value stored for targets that fail under `substitute-default`.
    /// Any TOML value; `null` when absent.
    #[serde(default)]
    pub default_value_on_error: serde_json::Value,

    /// Where fingerprints and objects are stored, relative to the pipeline
    /// file's directory.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    #[serde(default)]
    pub store_mode: StoreMode,

    /// Timeout for targets that do not set their own (e.g. `"30s"`).
    #[serde(default)]
    pub target_timeout: Option<String>,

    /// Command template for render targets, with `{input}` and `{output}`
    /// placeholders.
    #[serde(default = "default_renderer")]
    pub renderer: String,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_DIR)
}

fn default_renderer() -> String {
    DEFAULT_RENDER_TEMPLATE.to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            default_error_policy: ErrorPolicy::default(),
            default_format: StorageFormat::default(),
            worker_concurrency: None,
            default_value_on_error: serde_json::Value::Null,
            store_dir: default_store_dir(),
            store_mode: StoreMode::default(),
            target_timeout: None,
            renderer: default_renderer(),
        }
    }
}

/// `[[target]]` entry.
///
/// Exactly one of `cmd` (evaluated target) or `render` (document to render)
/// must be set.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub name: String,

    /// Command specification. References to other target names inside it
    /// become dependencies.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Document to render.
    #[serde(default)]
    pub render: Option<PathBuf>,

    /// Rendered artifact path. Defaults to the document path with an
    /// `.html` extension.
    #[serde(default)]
    pub output: Option<PathBuf>,

    /// Scan the rendered document for `read_target(..)` calls.
    #[serde(default = "default_scan")]
    pub scan: bool,

    #[serde(default)]
    pub format: Option<StorageFormat>,

    /// Per-target error policy override.
    #[serde(default)]
    pub error: Option<ErrorPolicy>,

    #[serde(default)]
    pub seed: Option<u64>,

    /// Dependencies in addition to the inferred ones.
    #[serde(default)]
    pub deps: Vec<String>,

    #[serde(default)]
    pub timeout: Option<String>,
}

fn default_scan() -> bool {
    true
}

impl TargetConfig {
    /// Artifact path of a render target.
    pub fn render_output(&self) -> Option<PathBuf> {
        let document = self.render.as_ref()?;
        Some(
            self.output
                .clone()
                .unwrap_or_else(|| document.with_extension("html")),
        )
    }
}
