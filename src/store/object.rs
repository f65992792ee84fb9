// src/store/object.rs

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{PipelineError, Result};
use crate::fingerprint::store::json_stems;
use crate::fs::FileSystem;
use crate::hash::{compute_file_hash, hash_value};
use crate::store::locks::KeyLocks;
use crate::types::{StorageFormat, TargetName};

/// Directory (below the store root) holding one object file per target.
pub const OBJECTS_DIR: &str = "objects";

/// A stored result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ObjectEntry {
    /// An in-memory value, serialized.
    Value {
        value: serde_json::Value,
        hash: String,
    },
    /// A tracked file. The store records where it is and what it contained;
    /// the bytes stay on disk.
    File { path: PathBuf, hash: String },
}

impl ObjectEntry {
    pub fn hash(&self) -> &str {
        match self {
            ObjectEntry::Value { hash, .. } | ObjectEntry::File { hash, .. } => hash,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            ObjectEntry::File { path, .. } => Some(path),
            ObjectEntry::Value { .. } => None,
        }
    }

    /// The value as seen by dependents: the value itself, or the tracked
    /// path as a string.
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            ObjectEntry::Value { value, .. } => value.clone(),
            ObjectEntry::File { path, .. } => {
                serde_json::Value::String(path.to_string_lossy().into_owned())
            }
        }
    }
}

/// Persistence of computed results keyed by target name.
///
/// Safe to call from several workers at once on different keys; writes to
/// the same key are serialized.
pub trait ObjectStore: Send + Sync + Debug {
    /// Store `value` for `name`.
    ///
    /// For [`StorageFormat::File`], `value` must be a path string. The file
    /// must exist; its content hash is recorded and the file is left in
    /// place.
    fn write(&self, name: &str, value: &serde_json::Value, format: StorageFormat)
        -> Result<ObjectEntry>;

    fn entry(&self, name: &str) -> Result<Option<ObjectEntry>>;

    /// Like [`entry`](Self::entry) but fails with
    /// [`PipelineError::NotFound`] when nothing was ever stored.
    fn read(&self, name: &str) -> Result<ObjectEntry> {
        self.entry(name)?
            .ok_or_else(|| PipelineError::NotFound(name.to_string()))
    }

    /// Delete the entry. Tracked files themselves are not touched.
    fn remove(&self, name: &str) -> Result<bool>;

    fn names(&self) -> Result<Vec<TargetName>>;
}

/// Turns an evaluator result into an [`ObjectEntry`], hashing tracked files
/// relative to `workdir`.
#[derive(Debug, Clone)]
pub struct EntryBuilder {
    workdir: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl EntryBuilder {
    pub fn new(workdir: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            workdir: workdir.into(),
            fs,
        }
    }

    /// Directory relative paths resolve against.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    /// Where a tracked path lives on disk.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workdir.join(path)
        }
    }

    pub fn build(
        &self,
        name: &str,
        value: &serde_json::Value,
        format: StorageFormat,
    ) -> Result<ObjectEntry> {
        match format {
            StorageFormat::Memory => Ok(ObjectEntry::Value {
                value: value.clone(),
                hash: hash_value(value),
            }),
            StorageFormat::File => {
                let Some(raw) = value.as_str() else {
                    return Err(PipelineError::Evaluator {
                        target: name.to_string(),
                        message: format!("file target must return a path, got {value}"),
                    });
                };
                let path = PathBuf::from(raw.trim());
                let hash = self.file_hash(name, &path)?;
                Ok(ObjectEntry::File { path, hash })
            }
        }
    }

    /// Current content hash of a tracked path.
    pub fn file_hash(&self, name: &str, path: &Path) -> Result<String> {
        let resolved = self.resolve(path);
        if !self.fs.is_file(&resolved) {
            return Err(PipelineError::FileTracking {
                target: name.to_string(),
                path: path.to_path_buf(),
            });
        }
        compute_file_hash(self.fs.as_ref(), &resolved)
            .map_err(|e| PipelineError::storage(name, format!("{e:#}")))
    }
}

/// Stores each entry as `<root>/objects/<name>.json`.
#[derive(Debug)]
pub struct FileObjectStore {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    builder: EntryBuilder,
    locks: KeyLocks,
}

impl FileObjectStore {
    pub fn new(root: impl Into<PathBuf>, builder: EntryBuilder, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            root: root.into(),
            fs,
            builder,
            locks: KeyLocks::new(),
        }
    }

    fn object_path(&self, name: &str) -> PathBuf {
        self.root.join(OBJECTS_DIR).join(format!("{name}.json"))
    }
}

impl ObjectStore for FileObjectStore {
    fn write(
        &self,
        name: &str,
        value: &serde_json::Value,
        format: StorageFormat,
    ) -> Result<ObjectEntry> {
        let entry = self.builder.build(name, value, format)?;
        let bytes = serde_json::to_vec(&entry)?;
        let path = self.object_path(name);
        self.locks.with_key(name, || {
            self.fs
                .write_atomic(&path, &bytes)
                .map_err(|e| PipelineError::storage(name, format!("{e:#}")))
        })?;
        debug!(target = %name, hash = %entry.hash(), "stored object (file)");
        Ok(entry)
    }

    fn entry(&self, name: &str) -> Result<Option<ObjectEntry>> {
        let path = self.object_path(name);
        if !self.fs.is_file(&path) {
            return Ok(None);
        }
        let contents = self
            .fs
            .read_to_string(&path)
            .map_err(|e| PipelineError::storage(name, format!("{e:#}")))?;
        let entry = serde_json::from_str(&contents)
            .map_err(|e| PipelineError::storage(name, format!("decoding {:?}: {e}", path)))?;
        Ok(Some(entry))
    }

    fn remove(&self, name: &str) -> Result<bool> {
        let path = self.object_path(name);
        let removed = self.locks.with_key(name, || {
            self.fs
                .remove_file(&path)
                .map_err(|e| PipelineError::storage(name, format!("{e:#}")))
        })?;
        if removed {
            info!(target = %name, "removed stored object (file)");
        }
        Ok(removed)
    }

    fn names(&self) -> Result<Vec<TargetName>> {
        let entries = self
            .fs
            .read_dir(&self.root.join(OBJECTS_DIR))
            .map_err(|e| PipelineError::storage("*", format!("{e:#}")))?;
        Ok(json_stems(&entries))
    }
}

/// Keeps entries for the lifetime of the process only.
#[derive(Debug)]
pub struct MemoryObjectStore {
    builder: EntryBuilder,
    map: DashMap<TargetName, ObjectEntry>,
}

impl MemoryObjectStore {
    pub fn new(builder: EntryBuilder) -> Self {
        Self {
            builder,
            map: DashMap::new(),
        }
    }
}

impl ObjectStore for MemoryObjectStore {
    fn write(
        &self,
        name: &str,
        value: &serde_json::Value,
        format: StorageFormat,
    ) -> Result<ObjectEntry> {
        let entry = self.builder.build(name, value, format)?;
        // DashMap's shard lock serializes writers of the same key.
        self.map.insert(name.to_string(), entry.clone());
        debug!(target = %name, hash = %entry.hash(), "stored object (memory)");
        Ok(entry)
    }

    fn entry(&self, name: &str) -> Result<Option<ObjectEntry>> {
        Ok(self.map.get(name).map(|e| e.value().clone()))
    }

    fn remove(&self, name: &str) -> Result<bool> {
        Ok(self.map.remove(name).is_some())
    }

    fn names(&self) -> Result<Vec<TargetName>> {
        let mut names: Vec<TargetName> = self.map.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;
    use crate::hash::hash_bytes;
    use serde_json::json;

    fn stores(fs: &MockFileSystem) -> Vec<Box<dyn ObjectStore>> {
        let shared: Arc<dyn FileSystem> = Arc::new(fs.clone());
        let builder = EntryBuilder::new("/p", Arc::clone(&shared));
        vec![
            Box::new(FileObjectStore::new("/p/.reprodag", builder.clone(), shared)),
            Box::new(MemoryObjectStore::new(builder)),
        ]
    }

    #[test]
    fn values_read_back_as_written() {
        let fs = MockFileSystem::new();
        for store in stores(&fs) {
            let value = json!({"rows": [1, 2, 3], "label": "clean"});
            let written = store.write("clean", &value, StorageFormat::Memory).unwrap();
            let read = store.read("clean").unwrap();
            assert_eq!(read, written);
            assert_eq!(read.to_value(), value);
        }
    }

    #[test]
    fn file_entries_track_path_and_content_hash() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/data/a.csv", "x\n1\n");
        for store in stores(&fs) {
            let entry = store
                .write("raw", &json!("data/a.csv"), StorageFormat::File)
                .unwrap();
            assert_eq!(entry.path(), Some(Path::new("data/a.csv")));
            assert_eq!(entry.hash(), hash_bytes(b"x\n1\n"));
            assert_eq!(store.read("raw").unwrap(), entry);
            // The tracked file is left alone.
            assert!(fs.is_file(Path::new("/p/data/a.csv")));
        }
    }

    #[test]
    fn missing_tracked_file_is_a_file_tracking_error() {
        let fs = MockFileSystem::new();
        for store in stores(&fs) {
            let err = store
                .write("raw", &json!("data/missing.csv"), StorageFormat::File)
                .unwrap_err();
            assert!(matches!(err, PipelineError::FileTracking { .. }));
            assert!(err.is_evaluation_failure());
            assert!(store.entry("raw").unwrap().is_none());
        }
    }

    #[test]
    fn read_without_entry_is_not_found() {
        let fs = MockFileSystem::new();
        for store in stores(&fs) {
            assert!(matches!(store.read("ghost"), Err(PipelineError::NotFound(_))));
            store.write("ghost", &json!(1), StorageFormat::Memory).unwrap();
            assert!(store.remove("ghost").unwrap());
            assert!(matches!(store.read("ghost"), Err(PipelineError::NotFound(_))));
        }
    }
}
