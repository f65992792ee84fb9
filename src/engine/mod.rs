// src/engine/mod.rs

//! Orchestration engine for reprodag.
//!
//! This module ties together:
//! - the per-run scheduler
//! - the worker that evaluates one target and updates the stores
//! - the main runtime event loop that reacts to:
//!   - target completion events
//!   - cancellation requests
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`]. [`Engine`] is the public entry point for
//! running, reading and inspecting a pipeline.

use chrono::{DateTime, Utc};

use crate::types::TargetName;

/// How the evaluation of one target ended, as reported by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// A value was produced and stored.
    Built,
    /// Evaluation failed; the configured default was stored instead.
    Substituted { error: String },
    /// Evaluation (or storing its result) failed.
    Failed { error: String },
}

/// A worker's report for one target.
#[derive(Debug, Clone)]
pub struct TargetResult {
    pub name: TargetName,
    pub evaluation: Evaluation,
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Events flowing into the runtime from workers and signal handlers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A worker finished a target.
    TargetCompleted(TargetResult),
    /// Stop starting new targets (e.g. Ctrl-C). Running targets finish.
    CancelRequested,
}

pub mod api;
pub mod core;
pub mod event_handlers;
pub mod runtime;
pub mod worker;

pub use api::{Engine, ManifestEntry, RunOptions};
pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::{CancelHandle, Runtime};
pub use worker::Worker;
