use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;
use reprodag::dag::{Completion, DagGraph, Scheduler, TargetRunState};
use reprodag::invalidate::{Classification, Classifications, OutdatedReason};
use reprodag::pipeline::Target;

/// A random acyclic declaration: target N may only depend on targets
/// 0..N-1. Each target is also randomly "current" (only allowed if all of
/// its dependencies are current, as the invalidation pass guarantees).
#[derive(Debug, Clone)]
struct Case {
    targets: Vec<Target>,
    current: Vec<bool>,
}

fn case_strategy(max_targets: usize) -> impl Strategy<Value = Case> {
    (1..=max_targets).prop_flat_map(|n| {
        (
            proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..n), n),
            proptest::collection::vec(any::<bool>(), n),
        )
            .prop_map(move |(raw_deps, wants_current)| {
                let mut targets = Vec::with_capacity(n);
                let mut current = Vec::with_capacity(n);
                for (i, potential) in raw_deps.into_iter().enumerate() {
                    let deps: HashSet<usize> = if i == 0 {
                        HashSet::new()
                    } else {
                        potential.into_iter().map(|d| d % i).collect()
                    };
                    let mut target = Target::new(format!("t_{i}"), "run()");
                    for d in &deps {
                        target = target.depends_on(format!("t_{d}"));
                    }
                    current.push(wants_current[i] && deps.iter().all(|d| current[*d]));
                    targets.push(target);
                }
                Case { targets, current }
            })
    })
}

fn classifications(case: &Case) -> Classifications {
    let mut classes = Classifications::default();
    for (target, current) in case.targets.iter().zip(&case.current) {
        let class = if *current {
            Classification::Current
        } else {
            Classification::Outdated(OutdatedReason::NeverBuilt)
        };
        classes.insert(target.name.clone(), class);
    }
    classes
}

fn satisfied(state: Option<TargetRunState>) -> bool {
    matches!(state, Some(TargetRunState::Current | TargetRunState::Built))
}

proptest! {
    #[test]
    fn scheduler_terminates_and_respects_dependencies(
        case in case_strategy(12),
        failing in proptest::collection::hash_set(0..12usize, 0..4),
        picks in proptest::collection::vec(any::<usize>(), 64),
        limit in 1..4usize,
    ) {
        let graph = Arc::new(DagGraph::build(&case.targets).unwrap());
        let mut scheduler = Scheduler::new(Arc::clone(&graph), &classifications(&case), None, 1);
        let failing: HashSet<String> = failing.into_iter().map(|i| format!("t_{i}")).collect();

        let mut running: Vec<String> = Vec::new();
        let mut started: HashSet<String> = HashSet::new();
        let mut steps = 0;
        let max_steps = 1000;

        loop {
            let free = limit - running.len();
            for scheduled in scheduler.next_ready(free) {
                for dep in &scheduled.deps {
                    prop_assert!(
                        satisfied(scheduler.run_state_of(dep)),
                        "{} started before {} was done", scheduled.name, dep
                    );
                }
                prop_assert!(started.insert(scheduled.name.clone()), "{} started twice", scheduled.name);
                running.push(scheduled.name);
            }
            prop_assert!(running.len() <= limit);
            prop_assert_eq!(scheduler.running_count(), running.len());

            if running.is_empty() {
                break;
            }

            steps += 1;
            prop_assert!(steps < max_steps, "simulation did not terminate");

            let pick = picks[steps % picks.len()] % running.len();
            let name = running.remove(pick);
            let completion = if failing.contains(&name) {
                Completion::Errored
            } else {
                Completion::Built
            };
            scheduler.handle_completion(&name, completion);
        }

        prop_assert!(scheduler.is_finished());

        for (name, state) in scheduler.states() {
            match state {
                TargetRunState::Built => {
                    prop_assert!(!failing.contains(&name));
                    for dep in graph.dependencies_of(&name) {
                        prop_assert!(satisfied(scheduler.run_state_of(dep)));
                    }
                }
                TargetRunState::Current => prop_assert!(!started.contains(&name)),
                TargetRunState::Errored => prop_assert!(failing.contains(&name)),
                TargetRunState::ErroredUpstream => {
                    prop_assert!(!started.contains(&name));
                    let failed_dep = graph
                        .dependencies_of(&name)
                        .iter()
                        .any(|d| !satisfied(scheduler.run_state_of(d)));
                    prop_assert!(failed_dep, "{} skipped without a failed dependency", name);
                }
                other => prop_assert!(false, "{} ended in non-terminal state {:?}", name, other),
            }
        }
    }

    #[test]
    fn cancelling_mid_run_still_terminates(
        case in case_strategy(10),
        cancel_after in 0..6usize,
    ) {
        let graph = Arc::new(DagGraph::build(&case.targets).unwrap());
        let mut scheduler = Scheduler::new(graph, &classifications(&case), None, 1);

        let mut running: Vec<String> = scheduler.next_ready(2).into_iter().map(|s| s.name).collect();
        let mut completed = 0;
        while let Some(name) = running.pop() {
            scheduler.handle_completion(&name, Completion::Built);
            completed += 1;
            if completed == cancel_after {
                scheduler.cancel();
            }
            running.extend(scheduler.next_ready(2 - running.len()).into_iter().map(|s| s.name));
        }

        prop_assert!(scheduler.is_finished());
        if scheduler.is_cancelled() {
            prop_assert!(scheduler.next_ready(10).is_empty());
        }
    }
}
