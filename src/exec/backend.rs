// src/exec/backend.rs

//! Pluggable evaluation backends.
//!
//! The engine never runs user logic itself. It hands each outdated target to
//! an [`Evaluator`] (ordinary targets) or a [`Renderer`] (render targets) and
//! treats both as opaque callables with captured inputs.
//!
//! - [`ShellEvaluator`](super::ShellEvaluator) / [`ShellRenderer`](super::ShellRenderer)
//!   are the implementations used by the `reprodag` binary.
//! - Tests provide their own implementations that, for example, record which
//!   targets were evaluated and return canned values.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use crate::errors::Result;
use crate::types::{StorageFormat, TargetName};

/// Boxed future returned by the backend traits.
pub type EvalFuture<'a> = Pin<Box<dyn Future<Output = Result<EvalOutput>> + Send + 'a>>;

/// A resolved dependency value handed to the evaluator.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// An in-memory dependency's stored value.
    Value(serde_json::Value),
    /// A file-tracked dependency: its path and the content hash recorded
    /// when it was built.
    File { path: PathBuf, hash: String },
}

impl Input {
    /// Text form used when passing the input to an external process.
    pub fn to_arg(&self) -> String {
        match self {
            Input::Value(serde_json::Value::String(s)) => s.clone(),
            Input::Value(other) => other.to_string(),
            Input::File { path, .. } => path.to_string_lossy().into_owned(),
        }
    }
}

/// Everything an evaluator gets to produce one target's value.
#[derive(Debug, Clone)]
pub struct EvalRequest {
    pub name: TargetName,
    /// The target's command specification, verbatim.
    pub source: String,
    pub format: StorageFormat,
    pub seed: u64,
    /// Direct dependencies by name.
    pub inputs: BTreeMap<TargetName, Input>,
}

/// Everything a renderer gets to produce one document.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub name: TargetName,
    pub document: PathBuf,
    pub output: PathBuf,
    pub inputs: BTreeMap<TargetName, Input>,
}

/// What an evaluator or renderer produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalOutput {
    /// The value to store. For file-format targets this must be a path
    /// string.
    pub value: serde_json::Value,
    /// Non-fatal diagnostics, copied into the run report.
    pub warnings: Vec<String>,
}

impl EvalOutput {
    pub fn new(value: serde_json::Value) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }
}

/// Runs a target's user-supplied logic.
///
/// Failures should be reported as
/// [`PipelineError::Evaluator`](crate::errors::PipelineError::Evaluator) so
/// the target's error policy applies.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, request: EvalRequest) -> EvalFuture<'_>;
}

/// Renders a document that reads other targets' values.
///
/// On success the returned value is the rendered artifact's path.
pub trait Renderer: Send + Sync {
    fn render(&self, request: RenderRequest) -> EvalFuture<'_>;
}
