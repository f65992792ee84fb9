// src/invalidate.rs

//! Invalidation engine: decides which targets are stale.
//!
//! Targets are visited in topological order so that every dependency is
//! classified before its dependents. A target is `current` only if it has a
//! record, its last run did not fail, every dependency is `current`, and its
//! recomputed fingerprint inputs equal the stored ones. File-tracked targets
//! without dependencies are additionally re-hashed from disk, which is how
//! edits to external files are noticed.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::dag::DagGraph;
use crate::errors::Result;
use crate::fingerprint::{inputs_for, FingerprintRecord};
use crate::pipeline::Settings;
use crate::store::{ObjectEntry, Store};
use crate::types::{StorageFormat, TargetName};

/// Classification of a single target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "kebab-case")]
pub enum Classification {
    Current,
    Outdated(OutdatedReason),
    /// The last run of this target failed under `fail-pipeline`.
    ErroredPreviously,
    /// The stored record or object could not be read. The target fails
    /// without running until its stored state is cleared.
    Unreadable(String),
}

impl Classification {
    pub fn is_current(&self) -> bool {
        matches!(self, Classification::Current)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Current => f.write_str("current"),
            Classification::Outdated(_) => f.write_str("outdated"),
            Classification::ErroredPreviously => f.write_str("errored-previously"),
            Classification::Unreadable(_) => f.write_str("unreadable"),
        }
    }
}

/// Why a target is outdated. Used for logs and the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutdatedReason {
    NeverBuilt,
    UpstreamOutdated(TargetName),
    CommandChanged,
    DependencyChanged(TargetName),
    /// Declared format or seed differ from the record.
    OptionsChanged,
    /// The stored object is missing or does not match the record.
    MissingObject,
    /// A tracked file's bytes differ from what was recorded.
    FileChanged,
}

impl fmt::Display for OutdatedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutdatedReason::NeverBuilt => f.write_str("never built"),
            OutdatedReason::UpstreamOutdated(dep) => write!(f, "upstream '{dep}' outdated"),
            OutdatedReason::CommandChanged => f.write_str("command changed"),
            OutdatedReason::DependencyChanged(dep) => write!(f, "dependency '{dep}' changed"),
            OutdatedReason::OptionsChanged => f.write_str("format or seed changed"),
            OutdatedReason::MissingObject => f.write_str("stored object missing"),
            OutdatedReason::FileChanged => f.write_str("tracked file changed"),
        }
    }
}

/// Result of classifying a whole graph. Read-only once computed.
#[derive(Debug, Clone, Default)]
pub struct Classifications {
    map: HashMap<TargetName, Classification>,
}

impl Classifications {
    pub fn get(&self, name: &str) -> Option<&Classification> {
        self.map.get(name)
    }

    pub fn is_current(&self, name: &str) -> bool {
        self.map.get(name).is_some_and(Classification::is_current)
    }

    /// Targets that need to run, in no particular order.
    pub fn stale(&self) -> impl Iterator<Item = &str> {
        self.map
            .iter()
            .filter(|(_, c)| !c.is_current())
            .map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Classification)> {
        self.map.iter().map(|(n, c)| (n.as_str(), c))
    }

    pub fn insert(&mut self, name: TargetName, classification: Classification) {
        self.map.insert(name, classification);
    }
}

/// Classify every target in `graph` against the stored fingerprints.
///
/// Reads only; never writes to the stores.
pub fn classify(graph: &DagGraph, settings: &Settings, store: &Store) -> Result<Classifications> {
    classify_selected(graph, settings, store, None)
}

/// Like [`classify`], restricted to `selection`, which must be closed under
/// ancestors. Targets outside it are left unclassified.
pub fn classify_selected(
    graph: &DagGraph,
    settings: &Settings,
    store: &Store,
    selection: Option<&HashSet<TargetName>>,
) -> Result<Classifications> {
    let mut out = Classifications::default();
    // Output hash of each current target, for its dependents.
    let mut output_hashes: HashMap<&str, String> = HashMap::new();

    for name in graph.topological_order() {
        if selection.is_some_and(|s| !s.contains(name)) {
            continue;
        }
        let (classification, output_hash) = classify_one(graph, settings, store, name, &out, &output_hashes);

        match &classification {
            Classification::Current => debug!(target = %name, "classified current"),
            Classification::Outdated(reason) => {
                debug!(target = %name, %reason, "classified outdated")
            }
            Classification::ErroredPreviously => {
                debug!(target = %name, "classified errored-previously")
            }
            Classification::Unreadable(error) => {
                warn!(target = %name, %error, "stored state unreadable")
            }
        }

        if let Some(hash) = output_hash {
            output_hashes.insert(name.as_str(), hash);
        }
        out.insert(name.clone(), classification);
    }

    Ok(out)
}

fn classify_one(
    graph: &DagGraph,
    settings: &Settings,
    store: &Store,
    name: &str,
    so_far: &Classifications,
    output_hashes: &HashMap<&str, String>,
) -> (Classification, Option<String>) {
    let Some(target) = graph.target(name) else {
        return (Classification::Outdated(OutdatedReason::NeverBuilt), None);
    };

    let record: FingerprintRecord = match store.fingerprints().get(name) {
        Ok(Some(record)) => record,
        Ok(None) => return (Classification::Outdated(OutdatedReason::NeverBuilt), None),
        Err(err) => return (Classification::Unreadable(err.to_string()), None),
    };

    if record.is_failed() {
        return (Classification::ErroredPreviously, None);
    }

    let deps = graph.dependencies_of(name);
    if let Some(stale) = deps.iter().find(|d| !so_far.is_current(d)) {
        return (
            Classification::Outdated(OutdatedReason::UpstreamOutdated(stale.clone())),
            None,
        );
    }

    let dep_hashes: Vec<(String, String)> = deps
        .iter()
        .filter_map(|d| output_hashes.get(d.as_str()).map(|h| (d.clone(), h.clone())))
        .collect();
    let inputs = inputs_for(target, settings, dep_hashes);

    if inputs != record.inputs {
        let reason = if inputs.command_hash != record.inputs.command_hash {
            OutdatedReason::CommandChanged
        } else if let Some(dep) = inputs
            .deps
            .iter()
            .find(|d| record.expected_dependency_hash(&d.name) != Some(d.output_hash.as_str()))
        {
            OutdatedReason::DependencyChanged(dep.name.clone())
        } else if inputs.deps.len() != record.inputs.deps.len() {
            // A dependency was dropped from the declaration.
            OutdatedReason::CommandChanged
        } else {
            OutdatedReason::OptionsChanged
        };
        return (Classification::Outdated(reason), None);
    }

    let Some(recorded_output) = record.output_hash.clone() else {
        return (Classification::Outdated(OutdatedReason::MissingObject), None);
    };

    let entry = match store.objects().entry(name) {
        Ok(Some(entry)) if entry.hash() == recorded_output => entry,
        Ok(_) => return (Classification::Outdated(OutdatedReason::MissingObject), None),
        Err(err) => return (Classification::Unreadable(err.to_string()), None),
    };

    if settings.format_of(target) == StorageFormat::File && deps.is_empty() {
        if let ObjectEntry::File { path, .. } = &entry {
            match store.entries().file_hash(name, path) {
                Ok(current) if current == recorded_output => {}
                Ok(current) => {
                    debug!(target = %name, path = ?path, old = %recorded_output, new = %current, "tracked file changed");
                    return (Classification::Outdated(OutdatedReason::FileChanged), None);
                }
                Err(err) => {
                    debug!(target = %name, error = %err, "tracked file unavailable");
                    return (Classification::Outdated(OutdatedReason::FileChanged), None);
                }
            }
        }
    }

    (Classification::Current, Some(recorded_output))
}
