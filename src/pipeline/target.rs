// src/pipeline/target.rs

//! Target declarations.

use std::path::PathBuf;
use std::time::Duration;

use crate::hash::{derive_seed, hash_bytes};
use crate::types::{ErrorPolicy, StorageFormat, TargetName};

/// A named unit of declared computation.
///
/// Declarations are immutable for the duration of a run. Options left as
/// `None` fall back to the pipeline [`Settings`](super::Settings).
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub name: TargetName,
    pub command: Command,
    pub format: Option<StorageFormat>,
    pub error_policy: Option<ErrorPolicy>,
    pub seed: Option<u64>,
    /// Dependencies declared explicitly, in addition to those inferred from
    /// the command source.
    pub extra_deps: Vec<TargetName>,
    pub timeout: Option<Duration>,
}

impl Target {
    /// A target evaluated by the external evaluator, with `source` as its
    /// command specification.
    pub fn new(name: impl Into<TargetName>, source: impl Into<String>) -> Self {
        Self::with_command(name, Command::evaluate(source))
    }

    pub fn with_command(name: impl Into<TargetName>, command: Command) -> Self {
        Self {
            name: name.into(),
            command,
            format: None,
            error_policy: None,
            seed: None,
            extra_deps: Vec::new(),
            timeout: None,
        }
    }

    pub fn format(mut self, format: StorageFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = Some(policy);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn depends_on(mut self, dep: impl Into<TargetName>) -> Self {
        self.extra_deps.push(dep.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The declared seed, or one derived from the target name.
    pub fn effective_seed(&self) -> u64 {
        self.seed.unwrap_or_else(|| derive_seed(&self.name))
    }

    pub fn is_render(&self) -> bool {
        matches!(self.command.kind, CommandKind::Render(_))
    }
}

/// Opaque command specification.
///
/// The engine never interprets `source`; it hashes it and, for evaluated
/// commands, scans it for references to other target names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub source: String,
    pub kind: CommandKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    /// Handed to the [`Evaluator`](crate::exec::Evaluator).
    Evaluate,
    /// Handed to the [`Renderer`](crate::exec::Renderer).
    Render(RenderSpec),
}

/// What a render target renders, and where to.
///
/// Keeps the declaration so the document can be re-read before each run
/// (see [`crate::render::refresh`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSpec {
    pub document: PathBuf,
    pub output: PathBuf,
    /// Content hash of `document` when it was last read.
    pub document_hash: String,
    /// Dependencies listed in the configuration, before scanning.
    pub declared_deps: Vec<TargetName>,
    pub scan_document: bool,
}

impl Command {
    pub fn evaluate(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            kind: CommandKind::Evaluate,
        }
    }

    pub fn render(spec: RenderSpec) -> Self {
        let source = format!(
            "render {} -> {} [{}]",
            spec.document.display(),
            spec.output.display(),
            spec.document_hash
        );
        Self {
            source,
            kind: CommandKind::Render(spec),
        }
    }

    /// Whether dependencies should be inferred by scanning `source`.
    ///
    /// Render targets carry their dependency set explicitly.
    pub fn infers_dependencies(&self) -> bool {
        matches!(self.kind, CommandKind::Evaluate)
    }

    pub fn hash(&self) -> String {
        hash_bytes(self.source.as_bytes())
    }
}
