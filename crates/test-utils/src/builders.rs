#![allow(dead_code)]

use std::time::Duration;

use reprodag::config::{ConfigSection, PipelineFile, RawPipelineFile, TargetConfig};
use reprodag::pipeline::{Pipeline, Settings, Target};
use reprodag::types::{ErrorPolicy, StorageFormat};

/// Builder for an in-memory `Pipeline` to simplify test setup.
///
/// Unlike the pipeline file, worker concurrency defaults to 1 here so tests
/// are deterministic unless they ask for more.
pub struct PipelineBuilder {
    targets: Vec<Target>,
    settings: Settings,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            targets: Vec::new(),
            settings: Settings {
                worker_concurrency: 1,
                ..Settings::default()
            },
        }
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.targets.push(target);
        self
    }

    /// Shorthand for an evaluated target with default options.
    pub fn target(self, name: &str, source: &str) -> Self {
        self.with_target(Target::new(name, source))
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.settings.worker_concurrency = n;
        self
    }

    pub fn default_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.settings.default_error_policy = policy;
        self
    }

    pub fn default_format(mut self, format: StorageFormat) -> Self {
        self.settings.default_format = format;
        self
    }

    pub fn default_value_on_error(mut self, value: serde_json::Value) -> Self {
        self.settings.default_value_on_error = value;
        self
    }

    pub fn target_timeout(mut self, timeout: Duration) -> Self {
        self.settings.target_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline::new(self.targets, self.settings)
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The four-target example used across the integration tests:
///
/// ```text
/// raw (file a.csv) -> clean -> model
/// plot2 (independent)
/// ```
pub fn raw_clean_model_plot2() -> Pipeline {
    PipelineBuilder::new()
        .with_target(Target::new("raw", "emit a.csv").format(StorageFormat::File))
        .target("clean", "tidy(raw)")
        .target("model", "fit(clean)")
        .target("plot2", "draw(axes)")
        .build()
}

/// Builder for `PipelineFile` (the validated TOML model).
pub struct PipelineFileBuilder {
    file: RawPipelineFile,
}

impl PipelineFileBuilder {
    pub fn new() -> Self {
        Self {
            file: RawPipelineFile {
                config: ConfigSection::default(),
                target: Vec::new(),
            },
        }
    }

    pub fn with_target(mut self, target: TargetConfig) -> Self {
        self.file.target.push(target);
        self
    }

    pub fn worker_concurrency(mut self, n: usize) -> Self {
        self.file.config.worker_concurrency = Some(n);
        self
    }

    pub fn default_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.file.config.default_error_policy = policy;
        self
    }

    pub fn target_timeout(mut self, timeout: &str) -> Self {
        self.file.config.target_timeout = Some(timeout.to_string());
        self
    }

    pub fn build_raw(self) -> RawPipelineFile {
        self.file
    }

    pub fn build(self) -> PipelineFile {
        PipelineFile::try_from(self.file).expect("Failed to build valid pipeline file from builder")
    }
}

impl Default for PipelineFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TargetConfig`.
pub struct TargetConfigBuilder {
    target: TargetConfig,
}

impl TargetConfigBuilder {
    pub fn new(name: &str, cmd: &str) -> Self {
        Self {
            target: TargetConfig {
                name: name.to_string(),
                cmd: Some(cmd.to_string()),
                render: None,
                output: None,
                scan: true,
                format: None,
                error: None,
                seed: None,
                deps: vec![],
                timeout: None,
            },
        }
    }

    pub fn render(name: &str, document: &str) -> Self {
        let mut builder = Self::new(name, "");
        builder.target.cmd = None;
        builder.target.render = Some(document.into());
        builder
    }

    pub fn output(mut self, path: &str) -> Self {
        self.target.output = Some(path.into());
        self
    }

    pub fn scan(mut self, val: bool) -> Self {
        self.target.scan = val;
        self
    }

    pub fn format(mut self, format: StorageFormat) -> Self {
        self.target.format = Some(format);
        self
    }

    pub fn error(mut self, policy: ErrorPolicy) -> Self {
        self.target.error = Some(policy);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.target.seed = Some(seed);
        self
    }

    pub fn dep(mut self, dep: &str) -> Self {
        self.target.deps.push(dep.to_string());
        self
    }

    pub fn timeout(mut self, duration: &str) -> Self {
        self.target.timeout = Some(duration.to_string());
        self
    }

    pub fn build(self) -> TargetConfig {
        self.target
    }
}
