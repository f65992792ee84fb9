// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use tracing::{debug, info};

use crate::dag::{Completion, ScheduledTarget, Scheduler};
use crate::engine::{Evaluation, TargetResult};
use crate::report::ReportBuilder;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Hand these targets to workers.
    DispatchTargets(Vec<ScheduledTarget>),
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Fill free worker slots with ready targets.
pub fn dispatch_ready(scheduler: &mut Scheduler, concurrency: usize) -> CoreStep {
    let mut commands = Vec::new();

    let free = concurrency.saturating_sub(scheduler.running_count());
    let ready = scheduler.next_ready(free);
    if !ready.is_empty() {
        commands.push(CoreCommand::DispatchTargets(ready));
    }

    CoreStep {
        commands,
        keep_running: !scheduler.is_finished(),
    }
}

/// Handle a worker's result.
///
/// - record it in the report
/// - a failure marks every pending dependent `errored-upstream`
/// - freed slots are refilled
pub fn handle_target_completed(
    scheduler: &mut Scheduler,
    report: &mut ReportBuilder,
    concurrency: usize,
    result: TargetResult,
) -> CoreStep {
    let TargetResult {
        name,
        evaluation,
        warnings,
        started_at,
        finished_at,
    } = result;

    let (completion, error) = match evaluation {
        Evaluation::Built => (Completion::Built, None),
        Evaluation::Substituted { error } => (Completion::Built, Some(error)),
        Evaluation::Failed { error } => (Completion::Errored, Some(error)),
    };

    report.record(&name, started_at, finished_at, warnings, error);

    let step = scheduler.handle_completion(&name, completion);
    for skipped in &step.newly_errored_upstream {
        report.record_skipped(skipped, &name);
    }
    if step.run_just_finished {
        debug!(target = %name, "last target of the run completed");
    }

    dispatch_ready(scheduler, concurrency)
}

/// Handle a cancellation request: nothing new starts, running targets finish.
pub fn handle_cancel_requested(scheduler: &mut Scheduler) -> CoreStep {
    let cancelled = scheduler.cancel();
    info!(
        cancelled = cancelled.len(),
        running = scheduler.running_count(),
        "cancellation requested; waiting for running targets"
    );

    CoreStep {
        commands: Vec::new(),
        keep_running: !scheduler.is_finished(),
    }
}
