// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dag::ScheduledTarget;
use crate::errors::Result;
use crate::report::RunReport;

use super::core::CoreRuntime;
use super::worker::Worker;
use super::{CoreCommand, Evaluation, RuntimeEvent, TargetResult};

/// Requests cancellation of a running pipeline.
///
/// Cancelling stops new targets from starting; targets already running are
/// allowed to finish. Cloneable; cancelling twice is harmless.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: mpsc::Sender<RuntimeEvent>,
}

impl CancelHandle {
    pub async fn cancel(&self) {
        if self.tx.send(RuntimeEvent::CancelRequested).await.is_err() {
            debug!("cancel requested after the run finished");
        }
    }

    /// Non-async variant for use from synchronous code (e.g. inside an
    /// evaluator). Returns `false` if the request could not be queued.
    pub fn try_cancel(&self) -> bool {
        self.tx.try_send(RuntimeEvent::CancelRequested).is_ok()
    }
}

/// Drives the per-run scheduler in response to `RuntimeEvent`s, and runs
/// each dispatched target on its own Tokio task.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics. At most `concurrency` workers run at any time because
/// the core only dispatches into free slots.
pub struct Runtime {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    event_tx: mpsc::Sender<RuntimeEvent>,
    worker: Arc<Worker>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(core: CoreRuntime, worker: Worker) -> (Self, CancelHandle) {
        let (event_tx, event_rx) = mpsc::channel(64);
        let handle = CancelHandle {
            tx: event_tx.clone(),
        };
        let runtime = Self {
            core,
            event_rx,
            event_tx,
            worker: Arc::new(worker),
        };
        (runtime, handle)
    }

    /// Main event loop.
    ///
    /// - Dispatches the initially ready targets.
    /// - Consumes `RuntimeEvent`s until every target is terminal.
    /// - Returns the run report.
    pub async fn run(mut self) -> Result<RunReport> {
        info!(concurrency = self.core.concurrency(), "runtime started");

        let mut step = self.core.start();
        loop {
            for command in step.commands {
                self.execute_command(command);
            }

            if !step.keep_running {
                break;
            }

            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    // We hold a sender ourselves, so this cannot happen.
                    warn!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");
            step = self.core.step(event);
        }

        let report = self.core.into_report();
        info!(run_id = report.run_id, cancelled = report.cancelled, "runtime exiting");
        Ok(report)
    }

    /// Execute a single command from the core.
    fn execute_command(&mut self, command: CoreCommand) {
        match command {
            CoreCommand::DispatchTargets(targets) => self.spawn_ready(targets),
        }
    }

    fn spawn_ready(&mut self, targets: Vec<ScheduledTarget>) {
        let names: Vec<_> = targets.iter().map(|t| t.name.as_str()).collect();
        debug!(?names, "spawning ready targets");

        for scheduled in targets {
            let worker = Arc::clone(&self.worker);
            let tx = self.event_tx.clone();
            tokio::spawn(async move {
                let name = scheduled.name.clone();
                let started_at = Utc::now();
                let result = match tokio::spawn(async move { worker.run(scheduled).await }).await {
                    Ok(result) => result,
                    Err(err) => TargetResult {
                        name,
                        evaluation: Evaluation::Failed {
                            error: format!("evaluation task aborted: {err}"),
                        },
                        warnings: Vec::new(),
                        started_at,
                        finished_at: Utc::now(),
                    },
                };
                if tx.send(RuntimeEvent::TargetCompleted(result)).await.is_err() {
                    warn!("runtime gone before target completion was delivered");
                }
            });
        }
    }
}
