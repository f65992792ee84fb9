// src/config/loader.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::config::model::{PipelineFile, RawPipelineFile, TargetConfig};
use crate::errors::{PipelineError, Result};
use crate::fs::FileSystem;
use crate::pipeline::{Pipeline, Target};
use crate::render::{DocumentScanner, RenderTarget};
use crate::store::Store;

/// Load a pipeline file from a given path and return the raw `RawPipelineFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(fs: &dyn FileSystem, path: impl AsRef<Path>) -> Result<RawPipelineFile> {
    let path = path.as_ref();
    let contents = fs.read_to_string(path).map_err(|e| {
        PipelineError::ConfigError(format!("reading pipeline file {path:?}: {e:#}"))
    })?;

    let config: RawPipelineFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a pipeline file from path and run basic validation.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks names, `cmd`/`render` exclusivity, concurrency and durations.
///
/// Graph-level checks (duplicates, unknown dependencies, cycles) happen
/// when the graph is built.
pub fn load_and_validate(fs: &dyn FileSystem, path: impl AsRef<Path>) -> Result<PipelineFile> {
    let raw = load_from_path(fs, &path)?;
    let file = PipelineFile::try_from(raw)?;
    Ok(file)
}

/// A loaded pipeline together with where it lives.
#[derive(Debug, Clone)]
pub struct LoadedPipeline {
    pub file: PipelineFile,
    pub pipeline: Pipeline,
    /// Directory commands run in and relative paths resolve against.
    pub workdir: PathBuf,
}

impl LoadedPipeline {
    /// Open the stores configured in `[config]`.
    pub fn open_store(&self, fs: Arc<dyn FileSystem>) -> Store {
        Store::open(
            self.file.config.store_mode,
            &self.workdir,
            &self.file.config.store_dir,
            fs,
        )
    }
}

/// Load, validate and convert a pipeline file into a [`Pipeline`].
///
/// Render targets are resolved through the render adapter, which reads
/// their documents.
pub fn load_pipeline(fs: &dyn FileSystem, path: impl AsRef<Path>) -> Result<LoadedPipeline> {
    let path = path.as_ref();
    let file = load_and_validate(fs, path)?;
    let workdir = pipeline_root_dir(path);

    let scanner = DocumentScanner::new()?;
    let mut pipeline = Pipeline::new(Vec::new(), file.settings());
    for (cfg, timeout) in file.targets() {
        let mut target = to_target(cfg, fs, &workdir, &scanner)?;
        target.timeout = timeout;
        pipeline.push(target);
    }

    debug!(
        path = ?path,
        workdir = ?workdir,
        targets = pipeline.targets().len(),
        "pipeline loaded"
    );

    Ok(LoadedPipeline {
        file,
        pipeline,
        workdir,
    })
}

fn to_target(
    cfg: &TargetConfig,
    fs: &dyn FileSystem,
    workdir: &Path,
    scanner: &DocumentScanner,
) -> Result<Target> {
    let mut target = match (&cfg.cmd, &cfg.render, cfg.render_output()) {
        (Some(cmd), _, _) => {
            let mut t = Target::new(cfg.name.clone(), cmd.clone());
            t.extra_deps = cfg.deps.clone();
            t.format = cfg.format;
            t
        }
        (None, Some(document), Some(output)) => {
            let mut render = RenderTarget::new(cfg.name.clone(), document.clone(), output)
                .scan_document(cfg.scan);
            render.deps = cfg.deps.clone();
            render.into_target(fs, workdir, scanner)?
        }
        _ => {
            return Err(PipelineError::ConfigError(format!(
                "target '{}' needs either `cmd` or `render`",
                cfg.name
            )));
        }
    };

    target.error_policy = cfg.error;
    target.seed = cfg.seed;
    Ok(target)
}

/// Directory of the pipeline file.
///
/// - If the path has a non-empty parent (e.g. "analysis/Reprodag.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Reprodag.toml" (parent = ""),
///   we fall back to the current working directory "."
pub fn pipeline_root_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Default pipeline file: `Reprodag.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Reprodag.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;
    use crate::types::{ErrorPolicy, StorageFormat};

    const PIPELINE: &str = r#"
[config]
worker_concurrency = 2

[[target]]
name = "raw"
cmd = "echo a.csv"
format = "file"

[[target]]
name = "clean"
cmd = "tidy $raw"
error = "substitute-default"

[[target]]
name = "report"
render = "report.md"
output = "out/report.pdf"
deps = ["raw"]
"#;

    #[test]
    fn loads_evaluated_and_render_targets_in_order() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/Reprodag.toml", PIPELINE);
        fs.add_file("/p/report.md", "Rows: read_target(clean)");

        let loaded = load_pipeline(&fs, "/p/Reprodag.toml").unwrap();
        assert_eq!(loaded.workdir, PathBuf::from("/p"));
        assert_eq!(loaded.pipeline.settings().worker_concurrency, 2);

        let names: Vec<_> = loaded.pipeline.names().collect();
        assert_eq!(names, vec!["raw", "clean", "report"]);

        let targets = loaded.pipeline.targets();
        assert_eq!(targets[0].format, Some(StorageFormat::File));
        assert_eq!(targets[1].error_policy, Some(ErrorPolicy::SubstituteDefault));
        assert!(targets[2].is_render());
        assert_eq!(targets[2].extra_deps, vec!["raw", "clean"]);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let fs = MockFileSystem::new();
        let err = load_pipeline(&fs, "/p/Reprodag.toml").unwrap_err();
        assert!(matches!(err, PipelineError::ConfigError(_)));
    }

    #[test]
    fn malformed_toml_is_a_toml_error() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/Reprodag.toml", "[[target]\nname = ");
        let err = load_pipeline(&fs, "/p/Reprodag.toml").unwrap_err();
        assert!(matches!(err, PipelineError::TomlError(_)));
    }
}
