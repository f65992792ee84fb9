// src/dag/state_manager.rs

//! Per-run state transitions for targets in the scheduler.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::dag::target_state::{RunState, ScheduledTarget, TargetInfo};
use crate::dag::DagGraph;
use crate::types::TargetName;

/// Manages per-run state transitions for targets.
pub struct StateManager<'a> {
    graph: &'a DagGraph,
    targets: &'a mut HashMap<TargetName, TargetInfo>,
    run_id: u64,
}

impl<'a> StateManager<'a> {
    pub fn new(
        graph: &'a DagGraph,
        targets: &'a mut HashMap<TargetName, TargetInfo>,
        run_id: u64,
    ) -> Self {
        Self {
            graph,
            targets,
            run_id,
        }
    }

    /// Mark every pending transitive dependent of a failed target as
    /// `ErroredUpstream`.
    ///
    /// Returns the newly marked targets (excluding the failed one).
    pub fn mark_dependents_errored_upstream(&mut self, failed: &str) -> Vec<TargetName> {
        let mut stack: Vec<TargetName> = self.graph.dependents_of(failed).to_vec();
        let mut newly_errored = Vec::new();

        while let Some(name) = stack.pop() {
            let Some(info) = self.targets.get_mut(&name) else {
                continue;
            };
            match info.run_state {
                Some(RunState::Pending) => {
                    info.run_state = Some(RunState::ErroredUpstream);
                    debug!(
                        target = %info.name,
                        upstream = %failed,
                        run_id = self.run_id,
                        "marking dependent errored-upstream"
                    );
                    newly_errored.push(info.name.clone());
                    stack.extend(self.graph.dependents_of(&name).iter().cloned());
                }
                Some(RunState::Running) => {
                    // Cannot happen: a dependent only starts after its deps
                    // are satisfied.
                    warn!(target = %info.name, upstream = %failed, "dependent already running");
                }
                _ => {}
            }
        }

        newly_errored
    }

    /// Collect up to `limit` pending targets whose dependencies are all
    /// satisfied, in declaration order, and mark them `Running`.
    pub fn collect_new_ready(&mut self, limit: usize) -> Vec<ScheduledTarget> {
        if limit == 0 {
            return Vec::new();
        }

        // Decide first, then mutate to avoid borrowing issues.
        let mut candidates: Vec<(usize, TargetName)> = {
            let ro = ReadOnlyStateManager::new(self.targets);
            self.targets
                .values()
                .filter(|info| {
                    matches!(info.run_state, Some(RunState::Pending))
                        && ro.deps_satisfied_for_info(info)
                })
                .map(|info| (info.position, info.name.clone()))
                .collect()
        };
        candidates.sort();
        candidates.truncate(limit);

        let mut ready = Vec::with_capacity(candidates.len());
        for (_, name) in candidates {
            let Some(target) = self.graph.target(&name) else {
                continue;
            };
            if let Some(info) = self.targets.get_mut(&name) {
                info!(target = %info.name, run_id = self.run_id, "scheduling target");
                info.run_state = Some(RunState::Running);
                ready.push(ScheduledTarget {
                    name: info.name.clone(),
                    target: target.clone(),
                    deps: info.deps.clone(),
                    run_id: self.run_id,
                });
            }
        }
        ready
    }

    /// Mark every pending target `Cancelled`. Running targets are left to
    /// finish.
    pub fn cancel_pending(&mut self) -> Vec<TargetName> {
        let mut cancelled: Vec<(usize, TargetName)> = Vec::new();
        for info in self.targets.values_mut() {
            if matches!(info.run_state, Some(RunState::Pending)) {
                info.run_state = Some(RunState::Cancelled);
                cancelled.push((info.position, info.name.clone()));
            }
        }
        cancelled.sort();
        cancelled.into_iter().map(|(_, name)| name).collect()
    }
}

/// A read-only view for checking dependency satisfaction.
pub struct ReadOnlyStateManager<'a> {
    targets: &'a HashMap<TargetName, TargetInfo>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(targets: &'a HashMap<TargetName, TargetInfo>) -> Self {
        Self { targets }
    }

    /// Whether all dependencies of the given target are `Current` or
    /// `Built` in this run.
    pub fn deps_satisfied_for_info(&self, info: &TargetInfo) -> bool {
        info.deps.iter().all(|dep_name| match self.targets.get(dep_name) {
            Some(dep) => dep.run_state.is_some_and(RunState::is_satisfied),
            None => {
                warn!(
                    target = %info.name,
                    dep = %dep_name,
                    "dependency missing from targets map"
                );
                false
            }
        })
    }
}
