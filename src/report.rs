// src/report.rs

//! Per-run log of target outcomes.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dag::TargetRunState;
use crate::types::TargetName;

/// Final outcome of one target in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetOutcome {
    /// Up to date; not evaluated.
    Current,
    /// Evaluated this run. May carry an error if a default was substituted.
    Built,
    Errored,
    /// Not attempted because an ancestor errored.
    ErroredUpstream,
    /// Not attempted because the run was cancelled.
    Cancelled,
    /// Not part of the selected targets.
    Skipped,
}

impl From<TargetRunState> for TargetOutcome {
    fn from(state: TargetRunState) -> Self {
        match state {
            TargetRunState::NotInRun => TargetOutcome::Skipped,
            TargetRunState::Current => TargetOutcome::Current,
            TargetRunState::Built => TargetOutcome::Built,
            TargetRunState::Errored => TargetOutcome::Errored,
            TargetRunState::ErroredUpstream => TargetOutcome::ErroredUpstream,
            // A run only ends once nothing is pending or running.
            TargetRunState::Pending | TargetRunState::Running | TargetRunState::Cancelled => {
                TargetOutcome::Cancelled
            }
        }
    }
}

impl fmt::Display for TargetOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetOutcome::Current => "current",
            TargetOutcome::Built => "built",
            TargetOutcome::Errored => "errored",
            TargetOutcome::ErroredUpstream => "errored-upstream",
            TargetOutcome::Cancelled => "cancelled",
            TargetOutcome::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub name: TargetName,
    pub outcome: TargetOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The result of one run. Always complete, even when targets errored;
/// callers inspect the entries rather than a single pass/fail flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
    /// One entry per declared target, in declaration order.
    pub entries: Vec<ReportEntry>,
}

impl RunReport {
    pub fn entry(&self, name: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn outcome_of(&self, name: &str) -> Option<TargetOutcome> {
        self.entry(name).map(|e| e.outcome)
    }

    /// Names with the given outcome, in declaration order.
    pub fn names_with(&self, outcome: TargetOutcome) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.outcome == outcome)
            .map(|e| e.name.as_str())
            .collect()
    }

    pub fn count(&self, outcome: TargetOutcome) -> usize {
        self.entries.iter().filter(|e| e.outcome == outcome).count()
    }

    /// Whether any target errored, directly or upstream.
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|e| {
            matches!(
                e.outcome,
                TargetOutcome::Errored | TargetOutcome::ErroredUpstream
            )
        })
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .entries
            .iter()
            .map(|e| e.name.len())
            .max()
            .unwrap_or(0);

        for entry in &self.entries {
            write!(f, "{:<width$}  {}", entry.name, entry.outcome)?;
            if let (Some(start), Some(end)) = (entry.started_at, entry.finished_at) {
                let ms = (end - start).num_milliseconds();
                write!(f, " ({ms} ms)")?;
            }
            if let Some(err) = &entry.error {
                write!(f, ": {err}")?;
            }
            writeln!(f)?;
            for warning in &entry.warnings {
                writeln!(f, "{:<width$}    warning: {warning}", "")?;
            }
        }

        write!(
            f,
            "{} built, {} current, {} errored, {} errored-upstream",
            self.count(TargetOutcome::Built),
            self.count(TargetOutcome::Current),
            self.count(TargetOutcome::Errored),
            self.count(TargetOutcome::ErroredUpstream),
        )?;
        let cancelled = self.count(TargetOutcome::Cancelled);
        if self.cancelled || cancelled > 0 {
            write!(f, ", {cancelled} cancelled")?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Progress {
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    warnings: Vec<String>,
    error: Option<String>,
}

/// Accumulates what happened to each target while a run is in progress.
#[derive(Debug)]
pub struct ReportBuilder {
    run_id: u64,
    started_at: DateTime<Utc>,
    progress: HashMap<TargetName, Progress>,
}

impl ReportBuilder {
    pub fn new(run_id: u64) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            progress: HashMap::new(),
        }
    }

    /// Record the evaluation of a target.
    pub fn record(
        &mut self,
        name: &str,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        warnings: Vec<String>,
        error: Option<String>,
    ) {
        let p = self.progress.entry(name.to_string()).or_default();
        p.started_at = Some(started_at);
        p.finished_at = Some(finished_at);
        p.warnings = warnings;
        p.error = error;
    }

    /// Record a failure that happened without evaluating the target.
    pub fn record_error(&mut self, name: &str, error: String) {
        let p = self.progress.entry(name.to_string()).or_default();
        p.error = Some(error);
    }

    /// Record that `name` will not run because `upstream` errored.
    pub fn record_skipped(&mut self, name: &str, upstream: &str) {
        let p = self.progress.entry(name.to_string()).or_default();
        p.error = Some(format!("upstream target '{upstream}' errored"));
    }

    /// Produce the report from the final run state of every target.
    pub fn finish(
        mut self,
        states: impl IntoIterator<Item = (TargetName, TargetRunState)>,
        cancelled: bool,
    ) -> RunReport {
        let entries = states
            .into_iter()
            .map(|(name, state)| {
                let p = self.progress.remove(&name).unwrap_or_default();
                ReportEntry {
                    outcome: state.into(),
                    name,
                    started_at: p.started_at,
                    finished_at: p.finished_at,
                    warnings: p.warnings,
                    error: p.error,
                }
            })
            .collect();

        RunReport {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            cancelled,
            entries,
        }
    }
}
