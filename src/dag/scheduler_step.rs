// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::types::TargetName;

/// Structured result of handling one completion.
///
/// Useful for tests that step the scheduler by hand and assert on what
/// changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Targets newly marked `ErroredUpstream` because of this step.
    pub newly_errored_upstream: Vec<TargetName>,
    /// Whether every target is now terminal.
    pub run_just_finished: bool,
}
