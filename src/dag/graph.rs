// src/dag/graph.rs

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, info};

use crate::dag::analyzer::{is_valid_target_name, ReferenceAnalyzer};
use crate::errors::{PipelineError, Result};
use crate::pipeline::Target;
use crate::types::TargetName;

/// Internal node structure: the declaration plus immediate deps and dependents.
#[derive(Debug, Clone)]
struct DagNode {
    target: Target,
    /// Direct dependencies, sorted by name.
    deps: Vec<TargetName>,
    /// Direct dependents, sorted by name.
    dependents: Vec<TargetName>,
}

/// Directed acyclic graph of targets, keyed by target name.
///
/// Built fresh for every run from the current declarations. Once built it is
/// read-only and can be shared between workers.
#[derive(Debug, Clone)]
pub struct DagGraph {
    nodes: HashMap<TargetName, DagNode>,
    /// Names in declaration order.
    declared: Vec<TargetName>,
    /// Names in a topological order (dependencies first).
    topo: Vec<TargetName>,
}

impl DagGraph {
    /// Build the graph from an ordered list of declarations.
    ///
    /// Dependencies are the union of each target's explicit `extra_deps` and
    /// the names found in its command source by the [`ReferenceAnalyzer`].
    ///
    /// Fails with:
    /// - [`PipelineError::InvalidName`] for names that are not identifiers,
    /// - [`PipelineError::DuplicateName`] if two declarations share a name,
    /// - [`PipelineError::UnknownDependency`] for explicit deps that are not
    ///   declared,
    /// - [`PipelineError::Cycle`] with one offending cycle otherwise.
    pub fn build(targets: &[Target]) -> Result<Self> {
        let mut declared_set: HashSet<&str> = HashSet::new();
        for target in targets {
            if !is_valid_target_name(&target.name) {
                return Err(PipelineError::InvalidName(target.name.clone()));
            }
            if !declared_set.insert(target.name.as_str()) {
                return Err(PipelineError::DuplicateName(target.name.clone()));
            }
        }

        let analyzer = ReferenceAnalyzer::new()?;
        let mut nodes: HashMap<TargetName, DagNode> = HashMap::new();

        // First pass: resolve each target's dependency set.
        for target in targets {
            let mut deps: BTreeSet<TargetName> = BTreeSet::new();

            for dep in &target.extra_deps {
                if dep == &target.name {
                    return Err(PipelineError::Cycle {
                        cycle: vec![dep.clone(), dep.clone()],
                    });
                }
                if !declared_set.contains(dep.as_str()) {
                    return Err(PipelineError::UnknownDependency {
                        target: target.name.clone(),
                        dependency: dep.clone(),
                    });
                }
                deps.insert(dep.clone());
            }

            if target.command.infers_dependencies() {
                let inferred =
                    analyzer.references(&target.name, &target.command.source, &declared_set);
                debug!(target = %target.name, ?inferred, "inferred dependencies");
                deps.extend(inferred);
            }

            nodes.insert(
                target.name.clone(),
                DagNode {
                    target: target.clone(),
                    deps: deps.into_iter().collect(),
                    dependents: Vec::new(),
                },
            );
        }

        // Second pass: populate dependents based on deps.
        for target in targets {
            let deps = nodes
                .get(&target.name)
                .map(|n| n.deps.clone())
                .unwrap_or_default();
            for dep in deps {
                if let Some(dep_node) = nodes.get_mut(&dep) {
                    dep_node.dependents.push(target.name.clone());
                }
            }
        }
        for node in nodes.values_mut() {
            node.dependents.sort();
        }

        let declared: Vec<TargetName> = targets.iter().map(|t| t.name.clone()).collect();
        let topo = topological_order(&declared, &nodes)?;

        info!(targets = declared.len(), "built target graph");

        Ok(Self {
            nodes,
            declared,
            topo,
        })
    }

    /// All target names, in declaration order.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.declared.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.declared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declared.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn target(&self, name: &str) -> Option<&Target> {
        self.nodes.get(name).map(|n| &n.target)
    }

    /// Immediate dependencies of a target.
    pub fn dependencies_of(&self, name: &str) -> &[TargetName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a target.
    pub fn dependents_of(&self, name: &str) -> &[TargetName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Dependencies first. Stable for identical declarations.
    pub fn topological_order(&self) -> &[TargetName] {
        &self.topo
    }

    /// The given targets plus everything they transitively depend on.
    ///
    /// Unknown names are returned as an error so that a typo on the command
    /// line does not silently run nothing.
    pub fn with_ancestors<'a, I>(&self, names: I) -> Result<HashSet<TargetName>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut closure = HashSet::new();
        let mut stack = Vec::new();
        for name in names {
            if !self.contains(name) {
                return Err(PipelineError::NotFound(name.to_string()));
            }
            stack.push(name.to_string());
        }
        while let Some(name) = stack.pop() {
            if closure.insert(name.clone()) {
                stack.extend(self.dependencies_of(&name).iter().cloned());
            }
        }
        Ok(closure)
    }

    /// Every target that transitively depends on `name`.
    pub fn descendants_of(&self, name: &str) -> HashSet<TargetName> {
        let mut seen = HashSet::new();
        let mut stack: Vec<TargetName> = self.dependents_of(name).to_vec();
        while let Some(next) = stack.pop() {
            if seen.insert(next.clone()) {
                stack.extend(self.dependents_of(&next).iter().cloned());
            }
        }
        seen
    }
}

/// Topologically sort the graph or report one concrete cycle.
///
/// Edge direction: dep -> target.
fn topological_order(
    declared: &[TargetName],
    nodes: &HashMap<TargetName, DagNode>,
) -> Result<Vec<TargetName>> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for name in declared {
        graph.add_node(name.as_str());
    }
    for name in declared {
        if let Some(node) = nodes.get(name) {
            for dep in &node.deps {
                graph.add_edge(dep.as_str(), name.as_str(), ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
        Err(cycle) => {
            let cycle = find_cycle(&graph).unwrap_or_else(|| vec![cycle.node_id().to_string()]);
            Err(PipelineError::Cycle { cycle })
        }
    }
}

/// Find one cycle, returned as `[a, b, ..., a]` following edge direction.
fn find_cycle(graph: &DiGraphMap<&str, ()>) -> Option<Vec<String>> {
    let component = tarjan_scc(graph)
        .into_iter()
        .filter(|scc| scc.len() > 1)
        .min_by_key(|scc| scc.iter().min().copied())?;
    let members: HashSet<&str> = component.iter().copied().collect();
    let start = component.iter().min().copied()?;

    // Depth-first walk inside the component until we get back to `start`.
    let mut path = vec![start];
    let mut visited: HashSet<&str> = HashSet::from([start]);
    let mut stack: Vec<Vec<&str>> = vec![successors_in(graph, start, &members)];

    while let Some(frontier) = stack.last_mut() {
        let Some(next) = frontier.pop() else {
            stack.pop();
            path.pop();
            continue;
        };
        if next == start {
            let mut cycle: Vec<String> = path.iter().map(|s| s.to_string()).collect();
            cycle.push(start.to_string());
            return Some(cycle);
        }
        if visited.insert(next) {
            path.push(next);
            stack.push(successors_in(graph, next, &members));
        }
    }
    None
}

fn successors_in<'g>(
    graph: &DiGraphMap<&'g str, ()>,
    node: &'g str,
    members: &HashSet<&str>,
) -> Vec<&'g str> {
    let mut next: Vec<&str> = graph
        .neighbors(node)
        .filter(|n| members.contains(n))
        .collect();
    // Reverse-sorted so that `pop()` explores alphabetically.
    next.sort_unstable_by(|a, b| b.cmp(a));
    next
}
