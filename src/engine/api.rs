// src/engine/api.rs

//! Public entry point: run, read and inspect a pipeline.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tracing::{debug, info};

use crate::dag::{DagGraph, Scheduler};
use crate::errors::{PipelineError, Result};
use crate::exec::Dispatcher;
use crate::invalidate::{Classification, Classifications, classify_selected};
use crate::pipeline::{Pipeline, Settings, Target};
use crate::render::{self, DocumentScanner};
use crate::report::RunReport;
use crate::store::{ObjectEntry, Store};
use crate::types::{StorageFormat, TargetName};

use super::core::CoreRuntime;
use super::runtime::{CancelHandle, Runtime};
use super::worker::Worker;

/// Per-invocation options of [`Engine::run`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Only bring these targets (and their ancestors) up to date. Empty
    /// means every target.
    pub targets: Vec<TargetName>,
    /// Override the configured worker concurrency.
    pub concurrency: Option<usize>,
}

impl RunOptions {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn target(mut self, name: impl Into<TargetName>) -> Self {
        self.targets.push(name.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = Some(n);
        self
    }
}

/// One row of [`Engine::manifest`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestEntry {
    pub name: TargetName,
    pub deps: Vec<TargetName>,
    pub format: StorageFormat,
    pub classification: Classification,
}

/// A pipeline bound to its graph, its stores and its evaluators.
///
/// Building the engine builds the graph, so cycles, duplicate names and
/// unknown dependencies are reported here, before anything runs. Pipelines
/// with render targets rebuild the graph whenever they are classified, so
/// document edits between runs are seen.
#[derive(Debug)]
pub struct Engine {
    pipeline: Pipeline,
    graph: RwLock<Arc<DagGraph>>,
    scanner: DocumentScanner,
    store: Store,
    dispatcher: Dispatcher,
    next_run_id: AtomicU64,
}

impl Engine {
    pub fn new(pipeline: Pipeline, store: Store, dispatcher: Dispatcher) -> Result<Self> {
        let graph = DagGraph::build(pipeline.targets())?;
        info!(targets = graph.len(), "pipeline graph built");
        Ok(Self {
            pipeline,
            graph: RwLock::new(Arc::new(graph)),
            scanner: DocumentScanner::new()?,
            store,
            dispatcher,
            next_run_id: AtomicU64::new(1),
        })
    }

    /// The graph as of the last classification.
    pub fn graph(&self) -> Arc<DagGraph> {
        Arc::clone(&self.graph.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn settings(&self) -> &Settings {
        self.pipeline.settings()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Classify every target. Read-only.
    pub fn classify(&self) -> Result<Classifications> {
        let graph = self.refresh_graph()?;
        classify_selected(&graph, self.settings(), &self.store, None)
    }

    /// The graph for a new classification. Render documents are re-read
    /// and the graph rebuilt, since edits can change both the command hash
    /// and the dependency set.
    fn refresh_graph(&self) -> Result<Arc<DagGraph>> {
        if !self.pipeline.targets().iter().any(Target::is_render) {
            return Ok(self.graph());
        }

        let entries = self.store.entries();
        let targets = self
            .pipeline
            .targets()
            .iter()
            .map(|t| render::refresh(t, entries.fs(), entries.workdir(), &self.scanner))
            .collect::<Result<Vec<_>>>()?;
        let graph = Arc::new(DagGraph::build(&targets)?);
        debug!(targets = graph.len(), "graph rebuilt from current documents");

        *self.graph.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&graph);
        Ok(graph)
    }

    /// The targets `options` selects (none means all), closed under
    /// ancestors.
    fn selection(
        graph: &DagGraph,
        options: &RunOptions,
    ) -> Result<Option<HashSet<TargetName>>> {
        if options.targets.is_empty() {
            return Ok(None);
        }
        let selected = graph.with_ancestors(options.targets.iter().map(String::as_str))?;
        Ok(Some(selected))
    }

    /// Classify and set up a run without starting it.
    ///
    /// The returned handle cancels the run once it is started with
    /// [`Runtime::run`].
    pub fn prepare(&self, options: &RunOptions) -> Result<(Runtime, CancelHandle)> {
        let graph = self.refresh_graph()?;
        let selection = Self::selection(&graph, options)?;
        let classes = classify_selected(&graph, self.settings(), &self.store, selection.as_ref())?;

        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        let scheduler = Scheduler::new(
            graph,
            &classes,
            selection.as_ref(),
            run_id,
        );
        let concurrency = options
            .concurrency
            .unwrap_or(self.settings().worker_concurrency);
        let core = CoreRuntime::new(scheduler, concurrency);

        let worker = Worker::new(
            self.store.clone(),
            Arc::new(self.settings().clone()),
            self.dispatcher.clone(),
        );

        debug!(run_id, concurrency, "run prepared");
        Ok(Runtime::new(core, worker))
    }

    /// Graph build → invalidation → scheduling. Returns the run report even
    /// when targets errored.
    pub async fn run(&self, options: &RunOptions) -> Result<RunReport> {
        let (runtime, _cancel) = self.prepare(options)?;
        runtime.run().await
    }

    /// Selected targets that a run would evaluate, in topological order.
    pub fn plan(&self, options: &RunOptions) -> Result<Vec<(TargetName, Classification)>> {
        let graph = self.refresh_graph()?;
        let selection = Self::selection(&graph, options)?;
        let classes = classify_selected(&graph, self.settings(), &self.store, selection.as_ref())?;
        Ok(graph
            .topological_order()
            .iter()
            .filter_map(|name| match classes.get(name) {
                Some(c) if !c.is_current() => Some((name.clone(), c.clone())),
                _ => None,
            })
            .collect())
    }

    /// The stored result of `name`.
    pub fn read(&self, name: &str) -> Result<ObjectEntry> {
        self.store.objects().read(name)
    }

    /// Name, dependencies, format and classification of every target, in
    /// declaration order.
    pub fn manifest(&self) -> Result<Vec<ManifestEntry>> {
        let classes = self.classify()?;
        let graph = self.graph();
        let settings = self.settings();

        self.pipeline
            .targets()
            .iter()
            .map(|target| {
                let classification = classes.get(&target.name).cloned().ok_or_else(|| {
                    PipelineError::NotFound(target.name.clone())
                })?;
                Ok(ManifestEntry {
                    name: target.name.clone(),
                    deps: graph.dependencies_of(&target.name).to_vec(),
                    format: settings.format_of(target),
                    classification,
                })
            })
            .collect()
    }

    /// Names a full run would evaluate, in declaration order.
    pub fn outdated(&self) -> Result<Vec<TargetName>> {
        let classes = self.classify()?;
        Ok(self
            .graph()
            .targets()
            .filter(|name| !classes.is_current(name))
            .map(str::to_string)
            .collect())
    }

    /// Remove fingerprint records and objects of the named (declared)
    /// targets. Returns the names that had something stored.
    pub fn clear(&self, names: &[TargetName]) -> Result<Vec<TargetName>> {
        self.ensure_declared(names)?;
        let mut removed = Vec::new();
        for name in names {
            if self.store.clear(name)? {
                info!(target = %name, "cleared stored state");
                removed.push(name.clone());
            }
        }
        Ok(removed)
    }

    /// Remove everything in the store, declared or not.
    pub fn clear_all(&self) -> Result<Vec<TargetName>> {
        let names = self.store.known_names()?;
        for name in &names {
            self.store.clear(name)?;
        }
        info!(count = names.len(), "cleared all stored state");
        Ok(names)
    }

    /// Remove only the fingerprint records of the named targets; their last
    /// values stay readable until they are rebuilt.
    pub fn invalidate(&self, names: &[TargetName]) -> Result<Vec<TargetName>> {
        self.ensure_declared(names)?;
        let mut removed = Vec::new();
        for name in names {
            if self.store.invalidate(name)? {
                info!(target = %name, "invalidated");
                removed.push(name.clone());
            }
        }
        Ok(removed)
    }

    /// Remove stored state of targets that are no longer declared.
    pub fn prune(&self) -> Result<Vec<TargetName>> {
        let mut pruned = Vec::new();
        for name in self.store.known_names()? {
            if !self.graph().contains(&name) {
                self.store.clear(&name)?;
                info!(target = %name, "pruned undeclared target");
                pruned.push(name);
            }
        }
        Ok(pruned)
    }

    /// Release the store handle.
    pub fn close(self) {
        self.store.close();
    }

    fn ensure_declared(&self, names: &[TargetName]) -> Result<()> {
        let graph = self.graph();
        match names.iter().find(|n| !graph.contains(n)) {
            Some(unknown) => Err(PipelineError::NotFound(unknown.clone())),
            None => Ok(()),
        }
    }
}
