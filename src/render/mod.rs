// src/render/mod.rs

//! Render-target adapter.
//!
//! A render target wraps an external document renderer as an ordinary graph
//! node. Its dependency set is the union of the names listed in its
//! configuration and the targets the document reads (see [`scanner`]).
//! The output is always file-tracked, and the document's content hash is
//! folded into the command so editing the document rebuilds it. Documents
//! are re-read before every run with [`refresh`].

pub mod scanner;

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::{PipelineError, Result};
use crate::fs::FileSystem;
use crate::hash::hash_bytes;
use crate::pipeline::{Command, CommandKind, RenderSpec, Target};
use crate::types::{StorageFormat, TargetName};

pub use scanner::DocumentScanner;

/// Declaration of a document to render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTarget {
    pub name: TargetName,
    pub document: PathBuf,
    pub output: PathBuf,
    pub deps: Vec<TargetName>,
    /// Scan the document for `read_target(..)` calls.
    pub scan_document: bool,
}

impl RenderTarget {
    pub fn new(
        name: impl Into<TargetName>,
        document: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            document: document.into(),
            output: output.into(),
            deps: Vec::new(),
            scan_document: true,
        }
    }

    pub fn depends_on(mut self, dep: impl Into<TargetName>) -> Self {
        self.deps.push(dep.into());
        self
    }

    pub fn scan_document(mut self, scan: bool) -> Self {
        self.scan_document = scan;
        self
    }

    fn from_spec(name: &str, spec: &RenderSpec) -> Self {
        Self {
            name: name.to_string(),
            document: spec.document.clone(),
            output: spec.output.clone(),
            deps: spec.declared_deps.clone(),
            scan_document: spec.scan_document,
        }
    }

    /// Read the document (relative paths resolve against `workdir`) and
    /// produce the graph node.
    pub fn into_target(
        self,
        fs: &dyn FileSystem,
        workdir: &Path,
        scanner: &DocumentScanner,
    ) -> Result<Target> {
        let doc_path = if self.document.is_absolute() {
            self.document.clone()
        } else {
            workdir.join(&self.document)
        };

        let content = fs.read_to_string(&doc_path).map_err(|e| {
            PipelineError::ConfigError(format!(
                "render target '{}': cannot read document {:?}: {e:#}",
                self.name, self.document
            ))
        })?;

        let mut deps = self.deps.clone();
        if self.scan_document {
            for name in scanner.references(&content) {
                if name != self.name && !deps.contains(&name) {
                    deps.push(name);
                }
            }
        }

        debug!(
            target = %self.name,
            document = ?self.document,
            ?deps,
            "resolved render target"
        );

        let spec = RenderSpec {
            document: self.document,
            output: self.output,
            document_hash: hash_bytes(content.as_bytes()),
            declared_deps: self.deps,
            scan_document: self.scan_document,
        };

        let mut target =
            Target::with_command(self.name, Command::render(spec)).format(StorageFormat::File);
        target.extra_deps = deps;
        Ok(target)
    }
}

/// Re-read the document of a render target, returning the target with the
/// document's current hash and dependency set. Other targets come back
/// unchanged.
pub fn refresh(
    target: &Target,
    fs: &dyn FileSystem,
    workdir: &Path,
    scanner: &DocumentScanner,
) -> Result<Target> {
    let CommandKind::Render(spec) = &target.command.kind else {
        return Ok(target.clone());
    };
    let mut refreshed =
        RenderTarget::from_spec(&target.name, spec).into_target(fs, workdir, scanner)?;
    refreshed.error_policy = target.error_policy;
    refreshed.seed = target.seed;
    refreshed.timeout = target.timeout;
    Ok(refreshed)
}
