// tests/shell_pipeline.rs
//
// End-to-end runs through the shell evaluator, the way the CLI wires it.
#![cfg(unix)]

mod common;
use crate::common::{TestResult, init_tracing, with_timeout_of};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use reprodag::config::load_pipeline;
use reprodag::engine::{Engine, RunOptions};
use reprodag::exec::{Dispatcher, ShellEvaluator, ShellRenderer};
use reprodag::fs::RealFileSystem;
use reprodag::report::{RunReport, TargetOutcome};

/// Each run spawns a handful of real shells.
const SHELL_BUDGET: Duration = Duration::from_secs(30);

const PIPELINE: &str = r#"
[config]
worker_concurrency = 2

[[target]]
name = "raw"
cmd = "echo data.csv"
format = "file"

[[target]]
name = "rows"
cmd = "wc -l < \"$raw\" | tr -d ' '"

[[target]]
name = "scaled"
cmd = "echo $((rows * 10))"

[[target]]
name = "broken"
cmd = "echo 'no such tool' >&2; exit 3"

[[target]]
name = "needs_broken"
cmd = "echo $broken"
"#;

async fn run_once(dir: &Path) -> anyhow::Result<(Engine, RunReport)> {
    let loaded = load_pipeline(&RealFileSystem, dir.join("Reprodag.toml"))?;
    let store = loaded.open_store(Arc::new(RealFileSystem));
    let dispatcher = Dispatcher::new(
        Arc::new(ShellEvaluator::new(&loaded.workdir)),
        Arc::new(ShellRenderer::new(
            &loaded.workdir,
            loaded.file.config.renderer.clone(),
        )),
    );
    let engine = Engine::new(loaded.pipeline, store, dispatcher)?;
    let report = engine.run(&RunOptions::all()).await?;
    Ok((engine, report))
}

#[tokio::test]
async fn shell_targets_pass_values_through_environment_variables() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("Reprodag.toml"), PIPELINE)?;
    std::fs::write(dir.path().join("data.csv"), "a\nb\nc\n")?;

    let (engine, report) = with_timeout_of(SHELL_BUDGET, run_once(dir.path())).await?;

    assert_eq!(report.outcome_of("raw"), Some(TargetOutcome::Built));
    assert_eq!(engine.read("rows")?.to_value(), json!(3));
    assert_eq!(engine.read("scaled")?.to_value(), json!(30));
    assert_eq!(report.outcome_of("broken"), Some(TargetOutcome::Errored));
    assert_eq!(report.outcome_of("needs_broken"), Some(TargetOutcome::ErroredUpstream));

    let broken = report.entry("broken").unwrap();
    assert!(broken.error.as_deref().unwrap_or_default().contains("no such tool"));
    engine.close();

    // Only the failed target and its dependent are attempted again.
    let (_, again) = with_timeout_of(SHELL_BUDGET, run_once(dir.path())).await?;
    assert_eq!(again.outcome_of("scaled"), Some(TargetOutcome::Current));
    assert_eq!(again.outcome_of("broken"), Some(TargetOutcome::Errored));

    std::fs::write(dir.path().join("data.csv"), "a\n")?;
    let (engine, edited) = with_timeout_of(SHELL_BUDGET, run_once(dir.path())).await?;
    assert_eq!(edited.outcome_of("raw"), Some(TargetOutcome::Built));
    assert_eq!(engine.read("scaled")?.to_value(), json!(10));
    Ok(())
}
