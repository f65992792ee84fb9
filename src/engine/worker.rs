// src/engine/worker.rs

//! Evaluation of a single scheduled target.
//!
//! A worker:
//! 1. reads its dependencies' stored objects (lazily, only now),
//! 2. hands the target to the [`Dispatcher`], under a timeout if configured,
//! 3. writes the object entry, then the fingerprint record, on Tokio's
//!    blocking pool.
//!
//! Evaluation failures go through the target's error policy. Storage
//! failures always fail the target. The object entry of a failed target is
//! never removed, so its last good value stays readable.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::dag::ScheduledTarget;
use crate::engine::{Evaluation, TargetResult};
use crate::errors::{PipelineError, Result};
use crate::exec::{Dispatcher, EvalOutput, Input};
use crate::fingerprint::{FingerprintInputs, FingerprintRecord, RecordStatus, inputs_for};
use crate::pipeline::{Settings, Target};
use crate::store::{ObjectEntry, Store};
use crate::types::{ErrorPolicy, StorageFormat, TargetName};

/// Shared, read-only state every worker needs.
#[derive(Debug, Clone)]
pub struct Worker {
    store: Store,
    settings: Arc<Settings>,
    dispatcher: Dispatcher,
}

impl Worker {
    pub fn new(store: Store, settings: Arc<Settings>, dispatcher: Dispatcher) -> Self {
        Self {
            store,
            settings,
            dispatcher,
        }
    }

    /// Evaluate `scheduled` and persist the outcome.
    ///
    /// Never fails: every problem is folded into the returned result.
    pub async fn run(&self, scheduled: ScheduledTarget) -> TargetResult {
        let started_at = Utc::now();
        let target = &scheduled.target;
        let name = scheduled.name.clone();

        info!(target = %name, run_id = scheduled.run_id, "evaluating target");

        let (evaluation, warnings) = match self.resolve_inputs(&name, &scheduled.deps) {
            Ok((inputs, dep_hashes)) => {
                let fingerprint = inputs_for(target, &self.settings, dep_hashes);
                self.evaluate_and_store(target, inputs, fingerprint).await
            }
            Err(err) => {
                warn!(target = %name, error = %err, "could not read dependency values");
                (Evaluation::Failed { error: err.to_string() }, Vec::new())
            }
        };

        match &evaluation {
            Evaluation::Built => info!(target = %name, "target built"),
            Evaluation::Substituted { error } => {
                warn!(target = %name, %error, "target failed; stored default value")
            }
            Evaluation::Failed { error } => warn!(target = %name, %error, "target errored"),
        }

        TargetResult {
            name,
            evaluation,
            warnings,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Dependency values for the evaluator, plus their output hashes for the
    /// new fingerprint.
    fn resolve_inputs(
        &self,
        name: &str,
        deps: &[TargetName],
    ) -> Result<(BTreeMap<TargetName, Input>, Vec<(TargetName, String)>)> {
        let mut inputs = BTreeMap::new();
        let mut hashes = Vec::with_capacity(deps.len());

        for dep in deps {
            let entry = self
                .store
                .objects()
                .read(dep)
                .map_err(|e| PipelineError::storage(name, format!("reading '{dep}': {e}")))?;
            hashes.push((dep.clone(), entry.hash().to_string()));
            let input = match entry {
                ObjectEntry::Value { value, .. } => Input::Value(value),
                ObjectEntry::File { path, hash } => Input::File { path, hash },
            };
            inputs.insert(dep.clone(), input);
        }

        Ok((inputs, hashes))
    }

    async fn evaluate_and_store(
        &self,
        target: &Target,
        inputs: BTreeMap<TargetName, Input>,
        fingerprint: FingerprintInputs,
    ) -> (Evaluation, Vec<String>) {
        let name = target.name.as_str();
        let format = self.settings.format_of(target);
        let mut warnings = Vec::new();

        let produced = match self.evaluate(target, format, inputs).await {
            Ok(EvalOutput { value, warnings: w }) => {
                warnings = w;
                self.write_object(name, value, format).await
            }
            Err(err) => Err(err),
        };

        let evaluation = match produced {
            Ok(entry) => {
                self.put_record(
                    name,
                    FingerprintRecord::new(
                        fingerprint,
                        Some(entry.hash().to_string()),
                        RecordStatus::Ok,
                    ),
                    Evaluation::Built,
                )
                .await
            }
            Err(err) if err.is_evaluation_failure() => {
                self.apply_error_policy(target, fingerprint, err).await
            }
            Err(err) => self.record_failure(name, fingerprint, err.to_string()).await,
        };

        (evaluation, warnings)
    }

    /// Run store IO (tracked-file hashing, synced writes) on Tokio's
    /// blocking pool.
    async fn blocking<T, F>(&self, name: &str, op: F) -> Result<T>
    where
        F: FnOnce(&Store) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| PipelineError::storage(name, format!("store task failed: {e}")))?
    }

    async fn write_object(
        &self,
        name: &str,
        value: serde_json::Value,
        format: StorageFormat,
    ) -> Result<ObjectEntry> {
        let key = name.to_string();
        self.blocking(name, move |store| store.objects().write(&key, &value, format))
            .await
    }

    async fn evaluate(
        &self,
        target: &Target,
        format: StorageFormat,
        inputs: BTreeMap<TargetName, Input>,
    ) -> Result<EvalOutput> {
        let fut = self.dispatcher.dispatch(target, format, inputs);
        match self.settings.timeout_of(target) {
            Some(after) => tokio::time::timeout(after, fut)
                .await
                .map_err(|_| PipelineError::Timeout {
                    target: target.name.clone(),
                    after,
                })?,
            None => fut.await,
        }
    }

    async fn apply_error_policy(
        &self,
        target: &Target,
        fingerprint: FingerprintInputs,
        err: PipelineError,
    ) -> Evaluation {
        let name = target.name.as_str();
        let message = err.to_string();

        match self.settings.policy_of(target) {
            ErrorPolicy::FailPipeline => self.record_failure(name, fingerprint, message).await,
            ErrorPolicy::SubstituteDefault => {
                let sentinel = self.settings.default_value_on_error.clone();
                debug!(target = %name, %sentinel, "substituting default value");
                match self.write_object(name, sentinel, StorageFormat::Memory).await {
                    Ok(entry) => {
                        self.put_record(
                            name,
                            FingerprintRecord::new(
                                fingerprint,
                                Some(entry.hash().to_string()),
                                RecordStatus::Substituted {
                                    message: message.clone(),
                                },
                            ),
                            Evaluation::Substituted { error: message },
                        )
                        .await
                    }
                    Err(store_err) => {
                        self.record_failure(
                            name,
                            fingerprint,
                            format!("{message}; storing default failed: {store_err}"),
                        )
                        .await
                    }
                }
            }
        }
    }

    /// Write a `Failed` record so the next run retries the target. The
    /// previous output hash is kept alongside it.
    async fn record_failure(
        &self,
        name: &str,
        fingerprint: FingerprintInputs,
        error: String,
    ) -> Evaluation {
        let key = name.to_string();
        let status = RecordStatus::Failed {
            message: error.clone(),
        };
        let recorded = self
            .blocking(name, move |store| {
                let previous_output = match store.fingerprints().get(&key) {
                    Ok(Some(record)) => record.output_hash,
                    _ => None,
                };
                let record = FingerprintRecord::new(fingerprint, previous_output, status);
                store.fingerprints().put(&key, &record)
            })
            .await;
        if let Err(err) = recorded {
            warn!(target = %name, error = %err, "could not record failure");
        }
        Evaluation::Failed { error }
    }

    async fn put_record(
        &self,
        name: &str,
        record: FingerprintRecord,
        ok: Evaluation,
    ) -> Evaluation {
        let key = name.to_string();
        let output_hash = record.output_hash.clone();
        match self
            .blocking(name, move |store| store.fingerprints().put(&key, &record))
            .await
        {
            Ok(()) => {
                debug!(target = %name, hash = ?output_hash, "fingerprint recorded");
                ok
            }
            Err(err) => Evaluation::Failed {
                error: err.to_string(),
            },
        }
    }
}
