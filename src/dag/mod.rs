// src/dag/mod.rs

//! Dependency graph and scheduling.
//!
//! - [`analyzer`] extracts target references from command sources.
//! - [`graph`] builds the acyclic graph of targets.
//! - [`scheduler`] contains the per-run state machine that decides which
//!   outdated targets are ready and which are skipped after a failure.
//! - [`target_state`] provides per-run states and scheduled target types.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages per-run state transitions.

pub mod analyzer;
pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod target_state;

pub use analyzer::ReferenceAnalyzer;
pub use graph::DagGraph;
pub use scheduler::{Completion, Scheduler, UnreadableTarget};
pub use scheduler_step::SchedulerStep;
pub use target_state::{ScheduledTarget, TargetRunState};
