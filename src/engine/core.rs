// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - spawning workers for `ScheduledTarget`s
//! - handing out cancellation handles
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, filesystem, or processes.

use crate::dag::{Scheduler, TargetRunState};
use crate::engine::RuntimeEvent;
use crate::engine::event_handlers::{
    CoreStep, dispatch_ready, handle_cancel_requested, handle_target_completed,
};
use crate::report::{ReportBuilder, RunReport};

/// Pure core runtime state.
///
/// This owns:
/// - the per-run scheduler
/// - the report being built
/// - the concurrency limit
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    report: ReportBuilder,
    concurrency: usize,
}

impl CoreRuntime {
    /// `concurrency` is clamped to at least 1.
    pub fn new(scheduler: Scheduler, concurrency: usize) -> Self {
        let mut report = ReportBuilder::new(scheduler.run_id());
        for failed in scheduler.unreadable() {
            report.record_error(&failed.name, failed.error.clone());
            for skipped in &failed.errored_upstream {
                report.record_skipped(skipped, &failed.name);
            }
        }
        Self {
            scheduler,
            report,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Expose whether the run is over (for tests).
    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    pub fn run_state_of(&self, name: &str) -> Option<TargetRunState> {
        self.scheduler.run_state_of(name)
    }

    /// Initial dispatch of the run.
    pub fn start(&mut self) -> CoreStep {
        dispatch_ready(&mut self.scheduler, self.concurrency)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::TargetCompleted(result) => handle_target_completed(
                &mut self.scheduler,
                &mut self.report,
                self.concurrency,
                result,
            ),
            RuntimeEvent::CancelRequested => handle_cancel_requested(&mut self.scheduler),
        }
    }

    /// Consume the core and produce the run report.
    pub fn into_report(self) -> RunReport {
        let cancelled = self.scheduler.is_cancelled();
        self.report.finish(self.scheduler.states(), cancelled)
    }
}
