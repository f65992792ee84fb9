// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fingerprint;
pub mod fs;
pub mod hash;
pub mod invalidate;
pub mod logging;
pub mod pipeline;
pub mod render;
pub mod report;
pub mod store;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::load_pipeline;
use crate::engine::{Engine, RunOptions};
use crate::exec::{Dispatcher, ShellEvaluator, ShellRenderer};
use crate::fs::{FileSystem, RealFileSystem};
use crate::report::{RunReport, TargetOutcome};
use crate::store::ObjectEntry;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - pipeline loading
/// - stores
/// - shell evaluator / renderer
/// - the engine operation selected on the command line
/// - Ctrl-C handling (cancels a running `make`)
pub async fn run(args: CliArgs) -> Result<()> {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let config_path = PathBuf::from(&args.config);
    let loaded = load_pipeline(fs.as_ref(), &config_path)?;

    let store = loaded.open_store(Arc::clone(&fs));
    let dispatcher = Dispatcher::new(
        Arc::new(ShellEvaluator::new(&loaded.workdir)),
        Arc::new(ShellRenderer::new(
            &loaded.workdir,
            loaded.file.config.renderer.clone(),
        )),
    );
    let engine = Engine::new(loaded.pipeline, store, dispatcher)?;

    let outcome = dispatch_command(&engine, args.command).await;
    engine.close();
    outcome
}

async fn dispatch_command(engine: &Engine, command: Command) -> Result<()> {
    match command {
        Command::Make {
            targets,
            jobs,
            json,
            dry_run,
        } => {
            let options = RunOptions {
                targets,
                concurrency: jobs.map(|j| j as usize),
            };
            if dry_run {
                print_plan(engine, &options)
            } else {
                make(engine, &options, json).await
            }
        }
        Command::Read { name } => {
            match engine.read(&name)? {
                ObjectEntry::Value { value, .. } => {
                    println!("{}", serde_json::to_string_pretty(&value)?)
                }
                ObjectEntry::File { path, .. } => println!("{}", path.display()),
            }
            Ok(())
        }
        Command::Manifest { json } => print_manifest(engine, json),
        Command::Outdated => {
            for name in engine.outdated()? {
                println!("{name}");
            }
            Ok(())
        }
        Command::Clean { names, all } => {
            let removed = if all {
                engine.clear_all()?
            } else if names.is_empty() {
                bail!("nothing to clean: name targets or pass --all");
            } else {
                engine.clear(&names)?
            };
            println!("cleaned {} target(s)", removed.len());
            Ok(())
        }
        Command::Invalidate { names } => {
            let removed = engine.invalidate(&names)?;
            println!("invalidated {} target(s)", removed.len());
            Ok(())
        }
        Command::Prune => {
            for name in engine.prune()? {
                println!("pruned {name}");
            }
            Ok(())
        }
    }
}

async fn make(engine: &Engine, options: &RunOptions, json: bool) -> Result<()> {
    let (runtime, cancel) = engine.prepare(options)?;

    // Ctrl-C → stop starting new targets; running ones finish.
    let ctrl_c = tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        info!("Ctrl+C received; cancelling run");
        cancel.cancel().await;
    });

    let report = runtime.run().await;
    ctrl_c.abort();
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }

    check_report(&report)
}

fn check_report(report: &RunReport) -> Result<()> {
    if report.cancelled {
        bail!("run cancelled");
    }
    if report.has_errors() {
        let errored = report.count(TargetOutcome::Errored);
        bail!("{errored} target(s) errored");
    }
    Ok(())
}

fn print_plan(engine: &Engine, options: &RunOptions) -> Result<()> {
    let plan = engine.plan(options)?;
    if plan.is_empty() {
        println!("everything is current");
    }
    for (name, classification) in plan {
        println!("would build {name} ({classification})");
    }
    Ok(())
}

fn print_manifest(engine: &Engine, json: bool) -> Result<()> {
    let manifest = engine.manifest()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
        return Ok(());
    }

    let width = manifest.iter().map(|m| m.name.len()).max().unwrap_or(0);
    for entry in manifest {
        let deps = if entry.deps.is_empty() {
            "-".to_string()
        } else {
            entry.deps.join(", ")
        };
        println!(
            "{:<width$}  {:<6}  {:<18}  {deps}",
            entry.name,
            entry.format.to_string(),
            entry.classification.to_string()
        );
    }
    Ok(())
}
