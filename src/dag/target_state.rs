// src/dag/target_state.rs

//! Per-run target state and the description of scheduled work.

use serde::Serialize;

use crate::pipeline::Target;
use crate::types::TargetName;

/// Per-run state of a target (internal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Outdated; waiting on dependencies.
    Pending,
    /// Handed to a worker.
    Running,
    /// Up to date at classification time; never dispatched this run.
    Current,
    /// Evaluated this run (possibly with a substituted value).
    Built,
    /// Evaluation failed this run.
    Errored,
    /// Skipped because an ancestor errored.
    ErroredUpstream,
    /// Never started because the run was cancelled.
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunState::Pending | RunState::Running)
    }

    /// Terminal and usable as input for dependents.
    pub fn is_satisfied(self) -> bool {
        matches!(self, RunState::Current | RunState::Built)
    }
}

/// Public, read-only view of a target's per-run state.
///
/// Exposed for tests and diagnostics without leaking the internal
/// `RunState` type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetRunState {
    /// Not selected for this run.
    NotInRun,
    Pending,
    Running,
    Current,
    Built,
    Errored,
    ErroredUpstream,
    Cancelled,
}

impl From<Option<RunState>> for TargetRunState {
    fn from(state: Option<RunState>) -> Self {
        match state {
            None => TargetRunState::NotInRun,
            Some(RunState::Pending) => TargetRunState::Pending,
            Some(RunState::Running) => TargetRunState::Running,
            Some(RunState::Current) => TargetRunState::Current,
            Some(RunState::Built) => TargetRunState::Built,
            Some(RunState::Errored) => TargetRunState::Errored,
            Some(RunState::ErroredUpstream) => TargetRunState::ErroredUpstream,
            Some(RunState::Cancelled) => TargetRunState::Cancelled,
        }
    }
}

/// Static target information plus per-run state.
#[derive(Debug, Clone)]
pub struct TargetInfo {
    pub name: TargetName,
    /// Direct dependencies.
    pub deps: Vec<TargetName>,
    /// Position in declaration order; used to break ties between ready
    /// targets.
    pub position: usize,
    /// `None` if not participating in the current run.
    pub run_state: Option<RunState>,
}

/// A target the scheduler wants a worker to run now.
#[derive(Debug, Clone)]
pub struct ScheduledTarget {
    pub name: TargetName,
    pub target: Target,
    /// Direct dependencies, all `Current` or `Built` at scheduling time.
    pub deps: Vec<TargetName>,
    pub run_id: u64,
}
