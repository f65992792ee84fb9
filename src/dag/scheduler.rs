// src/dag/scheduler.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dag::graph::DagGraph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::{ReadOnlyStateManager, StateManager};
use crate::dag::target_state::{RunState, ScheduledTarget, TargetInfo, TargetRunState};
use crate::invalidate::{Classification, Classifications};
use crate::types::TargetName;

/// How a dispatched target ended, as far as scheduling is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// A value (real or substituted) was stored; dependents may run.
    Built,
    /// The target failed; its dependents are skipped.
    Errored,
}

/// A target that fails before the run starts because its stored state
/// could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadableTarget {
    pub name: TargetName,
    pub error: String,
    /// Dependents skipped because of it.
    pub errored_upstream: Vec<TargetName>,
}

/// Pure per-run state machine: the immutable graph plus mutable run state.
///
/// It is responsible for:
/// - deciding which outdated targets are ready (all deps `Current`/`Built`)
/// - recording completions
/// - skipping the transitive dependents of failed targets
/// - cancellation (pending targets never start, running ones finish)
///
/// It performs no IO; the async [`Runtime`](crate::engine::Runtime) drives it.
#[derive(Debug)]
pub struct Scheduler {
    graph: Arc<DagGraph>,
    targets: HashMap<TargetName, TargetInfo>,
    unreadable: Vec<UnreadableTarget>,
    run_id: u64,
    cancelled: bool,
}

impl Scheduler {
    /// Set up a run.
    ///
    /// `selection` restricts the run to the given targets; callers are
    /// expected to pass a set closed under ancestors (see
    /// [`DagGraph::with_ancestors`]). Targets outside it do not participate.
    /// Selected targets that are current start out terminal, unreadable ones
    /// start out `Errored` (with their dependents `ErroredUpstream`), and
    /// everything else starts `Pending`.
    pub fn new(
        graph: Arc<DagGraph>,
        classifications: &Classifications,
        selection: Option<&HashSet<TargetName>>,
        run_id: u64,
    ) -> Self {
        let mut targets = HashMap::new();
        let mut failed_at_start = Vec::new();

        for (position, name) in graph.targets().enumerate() {
            let selected = selection.is_none_or(|s| s.contains(name));
            let run_state = if !selected {
                None
            } else {
                match classifications.get(name) {
                    Some(Classification::Current) => Some(RunState::Current),
                    Some(Classification::Unreadable(error)) => {
                        failed_at_start.push((name.to_string(), error.clone()));
                        Some(RunState::Errored)
                    }
                    _ => Some(RunState::Pending),
                }
            };

            targets.insert(
                name.to_string(),
                TargetInfo {
                    name: name.to_string(),
                    deps: graph.dependencies_of(name).to_vec(),
                    position,
                    run_state,
                },
            );
        }

        let mut unreadable = Vec::with_capacity(failed_at_start.len());
        for (name, error) in failed_at_start {
            warn!(
                target = %name,
                run_id,
                %error,
                "stored state unreadable; target fails without running"
            );
            let mut manager = StateManager::new(&graph, &mut targets, run_id);
            let errored_upstream = manager.mark_dependents_errored_upstream(&name);
            unreadable.push(UnreadableTarget {
                name,
                error,
                errored_upstream,
            });
        }

        debug!(run_id, targets = targets.len(), "scheduler: prepared run");

        Self {
            graph,
            targets,
            unreadable,
            run_id,
            cancelled: false,
        }
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    /// Targets that failed when the run was set up, in declaration order.
    pub fn unreadable(&self) -> &[UnreadableTarget] {
        &self.unreadable
    }

    /// Read-only view of the given target's run state.
    pub fn run_state_of(&self, name: &str) -> Option<TargetRunState> {
        let info = self.targets.get(name)?;
        Some(info.run_state.into())
    }

    /// Whether the dependencies of `name` are satisfied in this run.
    ///
    /// Returns `None` if the target is unknown.
    pub fn deps_satisfied(&self, name: &str) -> Option<bool> {
        let info = self.targets.get(name)?;
        let mgr = ReadOnlyStateManager::new(&self.targets);
        Some(mgr.deps_satisfied_for_info(info))
    }

    /// All target names in declaration order.
    pub fn target_names(&self) -> impl Iterator<Item = &str> {
        self.graph.targets()
    }

    /// Targets that can start now, at most `limit` of them.
    ///
    /// Returns nothing once the run has been cancelled.
    pub fn next_ready(&mut self, limit: usize) -> Vec<ScheduledTarget> {
        if self.cancelled {
            return Vec::new();
        }
        let mut manager = StateManager::new(&self.graph, &mut self.targets, self.run_id);
        manager.collect_new_ready(limit)
    }

    /// Record the completion of a dispatched target.
    pub fn handle_completion(&mut self, name: &str, completion: Completion) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        match self.targets.get_mut(name) {
            Some(info) if matches!(info.run_state, Some(RunState::Running)) => match completion {
                Completion::Built => {
                    info.run_state = Some(RunState::Built);
                    debug!(target = %name, run_id = self.run_id, "target built");
                }
                Completion::Errored => {
                    info.run_state = Some(RunState::Errored);
                    warn!(
                        target = %name,
                        run_id = self.run_id,
                        "target errored; skipping its dependents in this run"
                    );
                    let mut manager =
                        StateManager::new(&self.graph, &mut self.targets, self.run_id);
                    step.newly_errored_upstream = manager.mark_dependents_errored_upstream(name);
                }
            },
            Some(info) => {
                warn!(
                    target = %name,
                    state = ?info.run_state,
                    "completion for a target that is not running; ignoring"
                );
            }
            None => warn!(target = %name, "completion for unknown target; ignoring"),
        }

        step.run_just_finished = self.is_finished();
        step
    }

    /// Stop scheduling new targets. Already running targets are unaffected.
    ///
    /// Returns the targets that will now never start.
    pub fn cancel(&mut self) -> Vec<TargetName> {
        if self.cancelled {
            return Vec::new();
        }
        self.cancelled = true;
        let mut manager = StateManager::new(&self.graph, &mut self.targets, self.run_id);
        let cancelled = manager.cancel_pending();
        info!(
            run_id = self.run_id,
            cancelled = cancelled.len(),
            "scheduler: run cancelled"
        );
        cancelled
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn running_count(&self) -> usize {
        self.targets
            .values()
            .filter(|info| matches!(info.run_state, Some(RunState::Running)))
            .count()
    }

    /// Whether every participating target is terminal.
    pub fn is_finished(&self) -> bool {
        self.targets
            .values()
            .all(|info| info.run_state.is_none_or(RunState::is_terminal))
    }

    /// Final state of every target, in declaration order.
    pub fn states(&self) -> Vec<(TargetName, TargetRunState)> {
        self.graph
            .targets()
            .map(|name| {
                let state = self
                    .targets
                    .get(name)
                    .map(|info| info.run_state.into())
                    .unwrap_or(TargetRunState::NotInRun);
                (name.to_string(), state)
            })
            .collect()
    }
}
