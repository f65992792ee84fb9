// tests/pipeline_file.rs

mod common;
use crate::common::builders::{PipelineFileBuilder, TargetConfigBuilder};
use crate::common::fake_evaluator::{FakeEvaluator, fake_dispatcher};
use crate::common::{TestResult, init_tracing};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use reprodag::config::{PipelineFile, load_pipeline};
use reprodag::engine::{Engine, RunOptions};
use reprodag::errors::PipelineError;
use reprodag::fs::RealFileSystem;
use reprodag::report::{RunReport, TargetOutcome};
use reprodag::types::{ErrorPolicy, StorageFormat};

const PIPELINE: &str = r#"
[config]
worker_concurrency = 2
target_timeout = "5s"

[[target]]
name = "raw"
cmd = "emit a.csv"
format = "file"

[[target]]
name = "summary"
cmd = "summarise(raw)"
error = "substitute-default"

[[target]]
name = "report"
render = "report.md"
output = "out/report.html"
"#;

/// Load the pipeline in `dir` fresh (as a new process would) and run it.
async fn load_and_run(dir: &Path, eval: &Arc<FakeEvaluator>) -> reprodag::errors::Result<RunReport> {
    let fs = RealFileSystem;
    let loaded = load_pipeline(&fs, dir.join("Reprodag.toml"))?;
    let store = loaded.open_store(Arc::new(RealFileSystem));
    let dispatcher = fake_dispatcher(eval, &loaded.workdir);
    let engine = Engine::new(loaded.pipeline, store, dispatcher)?;
    let report = engine.run(&RunOptions::all()).await;
    engine.close();
    report
}

#[tokio::test]
async fn render_target_follows_its_document_and_the_targets_it_reads() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("Reprodag.toml"), PIPELINE)?;
    std::fs::write(dir.path().join("a.csv"), "x\n1\n")?;
    std::fs::write(dir.path().join("report.md"), "Rows: read_target(summary)\n")?;

    let eval = FakeEvaluator::new();
    eval.set_value("raw", json!("a.csv"));

    let first = load_and_run(dir.path(), &eval).await?;
    assert_eq!(first.count(TargetOutcome::Built), 3);
    let rendered = std::fs::read_to_string(dir.path().join("out/report.html"))?;
    assert!(rendered.starts_with("summary="), "unexpected render: {rendered}");
    assert!(dir.path().join(".reprodag").is_dir());

    let second = load_and_run(dir.path(), &eval).await?;
    assert_eq!(second.count(TargetOutcome::Current), 3);

    // Editing the document rebuilds only the render target.
    std::fs::write(dir.path().join("report.md"), "Rows: read_target(summary)!\n")?;
    let edited = load_and_run(dir.path(), &eval).await?;
    assert_eq!(edited.outcome_of("raw"), Some(TargetOutcome::Current));
    assert_eq!(edited.outcome_of("summary"), Some(TargetOutcome::Current));
    assert_eq!(edited.outcome_of("report"), Some(TargetOutcome::Built));

    // A new read_target call adds a dependency.
    std::fs::write(
        dir.path().join("report.md"),
        "Rows: read_target(summary) from load_target('raw')\n",
    )?;
    let widened = load_and_run(dir.path(), &eval).await?;
    assert_eq!(widened.outcome_of("report"), Some(TargetOutcome::Built));
    let rendered = std::fs::read_to_string(dir.path().join("out/report.html"))?;
    assert!(rendered.contains("raw=a.csv"), "unexpected render: {rendered}");
    Ok(())
}

#[tokio::test]
async fn a_long_lived_engine_sees_document_edits() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("Reprodag.toml"), PIPELINE)?;
    std::fs::write(dir.path().join("a.csv"), "x\n1\n")?;
    std::fs::write(dir.path().join("report.md"), "Rows: read_target(summary)\n")?;

    let eval = FakeEvaluator::new();
    eval.set_value("raw", json!("a.csv"));
    let loaded = load_pipeline(&RealFileSystem, dir.path().join("Reprodag.toml"))?;
    let store = loaded.open_store(Arc::new(RealFileSystem));
    let engine = Engine::new(loaded.pipeline, store, fake_dispatcher(&eval, &loaded.workdir))?;

    let first = engine.run(&RunOptions::all()).await?;
    assert_eq!(first.outcome_of("report"), Some(TargetOutcome::Built));
    assert_eq!(engine.graph().dependencies_of("report"), ["summary".to_string()]);

    std::fs::write(dir.path().join("report.md"), "Source: load_target(raw)\n")?;
    assert_eq!(engine.outdated()?, vec!["report"]);

    let second = engine.run(&RunOptions::all()).await?;
    assert_eq!(second.outcome_of("raw"), Some(TargetOutcome::Current));
    assert_eq!(second.outcome_of("report"), Some(TargetOutcome::Built));
    assert_eq!(engine.graph().dependencies_of("report"), ["raw".to_string()]);
    let rendered = std::fs::read_to_string(dir.path().join("out/report.html"))?;
    assert!(rendered.contains("raw=a.csv"), "unexpected render: {rendered}");

    let third = engine.run(&RunOptions::all()).await?;
    assert_eq!(third.count(TargetOutcome::Current), 3);
    Ok(())
}

#[tokio::test]
async fn missing_document_is_a_config_error() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("Reprodag.toml"), PIPELINE)?;

    let eval = FakeEvaluator::new();
    let err = load_and_run(dir.path(), &eval).await.unwrap_err();
    assert!(matches!(err, PipelineError::ConfigError(msg) if msg.contains("report.md")));
    Ok(())
}

#[test]
fn settings_and_per_target_options_come_from_the_file() -> TestResult {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("Reprodag.toml"), PIPELINE)?;
    std::fs::write(dir.path().join("report.md"), "no reads here")?;

    let loaded = load_pipeline(&RealFileSystem, dir.path().join("Reprodag.toml"))?;
    let settings = loaded.pipeline.settings();
    assert_eq!(settings.worker_concurrency, 2);
    assert_eq!(settings.target_timeout, Some(Duration::from_secs(5)));

    let targets = loaded.pipeline.targets();
    assert_eq!(settings.format_of(&targets[0]), StorageFormat::File);
    assert_eq!(settings.policy_of(&targets[1]), ErrorPolicy::SubstituteDefault);
    assert_eq!(settings.policy_of(&targets[0]), ErrorPolicy::FailPipeline);
    assert!(targets[2].is_render());
    assert!(targets[2].extra_deps.is_empty());
    Ok(())
}

#[test]
fn builder_files_are_validated() {
    let ok = PipelineFileBuilder::new()
        .worker_concurrency(3)
        .target_timeout("250ms")
        .with_target(TargetConfigBuilder::new("raw", "load()").timeout("2m").build())
        .with_target(TargetConfigBuilder::render("report", "report.md").dep("raw").build())
        .build();
    let settings = ok.settings();
    assert_eq!(settings.worker_concurrency, 3);
    assert_eq!(settings.target_timeout, Some(Duration::from_millis(250)));
    let timeouts: Vec<_> = ok.targets().map(|(_, t)| t).collect();
    assert_eq!(timeouts, vec![Some(Duration::from_secs(120)), None]);

    let both = PipelineFileBuilder::new()
        .with_target(TargetConfigBuilder::new("x", "run()").output("x.html").build())
        .build_raw();
    assert!(matches!(PipelineFile::try_from(both), Err(PipelineError::ConfigError(_))));

    let zero = PipelineFileBuilder::new()
        .worker_concurrency(0)
        .with_target(TargetConfigBuilder::new("x", "run()").build())
        .build_raw();
    assert!(matches!(PipelineFile::try_from(zero), Err(PipelineError::ConfigError(_))));

    let bad_timeout = PipelineFileBuilder::new()
        .with_target(TargetConfigBuilder::new("x", "run()").timeout("soon").build())
        .build_raw();
    assert!(matches!(
        PipelineFile::try_from(bad_timeout),
        Err(PipelineError::ConfigError(msg)) if msg.contains("timeout")
    ));

    let bad_name = PipelineFileBuilder::new()
        .with_target(TargetConfigBuilder::new("my-target", "run()").build())
        .build_raw();
    assert!(matches!(PipelineFile::try_from(bad_name), Err(PipelineError::InvalidName(_))));

    let shadowing = PipelineFileBuilder::new()
        .with_target(TargetConfigBuilder::new("PATH", "echo /tmp").build())
        .build_raw();
    assert!(matches!(PipelineFile::try_from(shadowing), Err(PipelineError::InvalidName(_))));
}
