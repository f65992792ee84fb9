// src/exec/mod.rs

//! Evaluation layer.
//!
//! This module is responsible for actually producing target values, by
//! handing each target to an external collaborator and reporting back what
//! it produced.
//!
//! - [`backend`] defines the `Evaluator` and `Renderer` traits and the
//!   request/response types that cross them.
//! - [`shell`] contains the process-based implementations used by the CLI.
//! - [`dispatch`] routes a target to the right collaborator.

pub mod backend;
pub mod dispatch;
pub mod shell;

pub use backend::{EvalFuture, EvalOutput, EvalRequest, Evaluator, Input, RenderRequest, Renderer};
pub use dispatch::Dispatcher;
pub use shell::{DEFAULT_RENDER_TEMPLATE, ShellEvaluator, ShellRenderer};
