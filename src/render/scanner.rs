// src/render/scanner.rs

//! Finds the targets a document reads.

use std::collections::BTreeSet;

use regex::Regex;

use crate::errors::Result;
use crate::types::TargetName;

/// `read_target(name)` or `load_target(name)`, optionally quoted.
const READ_CALL_PATTERN: &str =
    r#"\b(?:read_target|load_target)\(\s*["']?([A-Za-z_][A-Za-z0-9_]*)["']?\s*\)"#;

#[derive(Debug, Clone)]
pub struct DocumentScanner {
    read_call: Regex,
}

impl DocumentScanner {
    pub fn new() -> Result<Self> {
        let read_call = Regex::new(READ_CALL_PATTERN)
            .map_err(|e| anyhow::anyhow!("compiling document scan pattern: {e}"))?;
        Ok(Self { read_call })
    }

    /// Names of all targets read by `document`.
    pub fn references(&self, document: &str) -> BTreeSet<TargetName> {
        self.read_call
            .captures_iter(document)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .collect()
    }
}
