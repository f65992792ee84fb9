// src/fingerprint/store.rs

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::errors::{PipelineError, Result};
use crate::fingerprint::FingerprintRecord;
use crate::fs::FileSystem;
use crate::store::locks::KeyLocks;
use crate::types::TargetName;

/// Directory (below the store root) holding one record file per target.
pub const META_DIR: &str = "meta";

/// Key-value persistence of fingerprint records, one per target name.
pub trait FingerprintStore: Send + Sync + Debug {
    fn get(&self, name: &str) -> Result<Option<FingerprintRecord>>;

    /// Atomically replace the record for `name`. A failure here never
    /// affects records of other targets.
    fn put(&self, name: &str, record: &FingerprintRecord) -> Result<()>;

    /// Remove the record for `name`. Returns `false` if there was none.
    fn clear(&self, name: &str) -> Result<bool>;

    /// Names of all targets that currently have a record.
    fn names(&self) -> Result<Vec<TargetName>>;
}

/// Stores each record as `<root>/meta/<name>.json`.
///
/// Every record lives in its own file and is replaced with a
/// write-then-rename, so a crash mid-write leaves every other record intact.
#[derive(Debug)]
pub struct FileFingerprintStore {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    locks: KeyLocks,
}

impl FileFingerprintStore {
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            root: root.into(),
            fs,
            locks: KeyLocks::new(),
        }
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.root.join(META_DIR).join(format!("{name}.json"))
    }
}

impl FingerprintStore for FileFingerprintStore {
    fn get(&self, name: &str) -> Result<Option<FingerprintRecord>> {
        let path = self.record_path(name);
        if !self.fs.is_file(&path) {
            return Ok(None);
        }
        let contents = self
            .fs
            .read_to_string(&path)
            .map_err(|e| PipelineError::storage(name, format!("{e:#}")))?;
        let record = serde_json::from_str(&contents)
            .map_err(|e| PipelineError::storage(name, format!("decoding {:?}: {e}", path)))?;
        Ok(Some(record))
    }

    fn put(&self, name: &str, record: &FingerprintRecord) -> Result<()> {
        let path = self.record_path(name);
        let bytes = serde_json::to_vec_pretty(record)?;
        self.locks.with_key(name, || {
            self.fs
                .write_atomic(&path, &bytes)
                .map_err(|e| PipelineError::storage(name, format!("{e:#}")))
        })?;
        debug!(target = %name, path = ?path, "stored fingerprint record (file)");
        Ok(())
    }

    fn clear(&self, name: &str) -> Result<bool> {
        let path = self.record_path(name);
        let removed = self.locks.with_key(name, || {
            self.fs
                .remove_file(&path)
                .map_err(|e| PipelineError::storage(name, format!("{e:#}")))
        })?;
        if removed {
            info!(target = %name, "cleared fingerprint record (file)");
        }
        Ok(removed)
    }

    fn names(&self) -> Result<Vec<TargetName>> {
        let dir = self.root.join(META_DIR);
        let entries = self
            .fs
            .read_dir(&dir)
            .map_err(|e| PipelineError::storage("*", format!("{e:#}")))?;
        Ok(json_stems(&entries))
    }
}

/// Keeps records for the lifetime of the process only.
#[derive(Debug, Default)]
pub struct MemoryFingerprintStore {
    map: DashMap<TargetName, FingerprintRecord>,
}

impl MemoryFingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FingerprintStore for MemoryFingerprintStore {
    fn get(&self, name: &str) -> Result<Option<FingerprintRecord>> {
        Ok(self.map.get(name).map(|r| r.value().clone()))
    }

    fn put(&self, name: &str, record: &FingerprintRecord) -> Result<()> {
        self.map.insert(name.to_string(), record.clone());
        debug!(target = %name, "stored fingerprint record (memory)");
        Ok(())
    }

    fn clear(&self, name: &str) -> Result<bool> {
        Ok(self.map.remove(name).is_some())
    }

    fn names(&self) -> Result<Vec<TargetName>> {
        let mut names: Vec<TargetName> = self.map.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }
}

/// File stems of `*.json` entries, sorted. Temp files (`.name.json.tmp`)
/// are skipped.
pub(crate) fn json_stems(entries: &[PathBuf]) -> Vec<TargetName> {
    let mut names: Vec<TargetName> = entries
        .iter()
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .filter_map(|p| p.file_stem().and_then(|s| s.to_str()))
        .filter(|stem| !stem.starts_with('.'))
        .map(str::to_string)
        .collect();
    names.sort();
    names
}
