// src/store/mod.rs

//! Persistent pipeline state.
//!
//! - [`object`] stores computed values and tracked file paths.
//! - [`locks`] provides single-writer-per-key locking.
//!
//! [`Store`] bundles the object store with the fingerprint store into the
//! explicit handle that the invalidation engine and the runtime are given.
//! It is opened once per run and closed when the run ends.

pub mod locks;
pub mod object;

pub use object::{
    EntryBuilder, FileObjectStore, MemoryObjectStore, ObjectEntry, ObjectStore,
};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::Result;
use crate::fingerprint::{FileFingerprintStore, FingerprintStore, MemoryFingerprintStore};
use crate::fs::FileSystem;
use crate::types::{StoreMode, TargetName};

/// Default store directory, relative to the pipeline directory.
pub const DEFAULT_STORE_DIR: &str = ".reprodag";

/// Handle to the fingerprint and object stores of one pipeline.
///
/// Cheap to clone; clones share the underlying stores.
#[derive(Debug, Clone)]
pub struct Store {
    fingerprints: Arc<dyn FingerprintStore>,
    objects: Arc<dyn ObjectStore>,
    entries: EntryBuilder,
}

impl Store {
    /// Open the stores for a pipeline rooted at `workdir`.
    ///
    /// `store_dir` is resolved relative to `workdir` unless absolute.
    pub fn open(
        mode: StoreMode,
        workdir: &Path,
        store_dir: &Path,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        let entries = EntryBuilder::new(workdir, Arc::clone(&fs));
        match mode {
            StoreMode::File => {
                let root: PathBuf = entries.resolve(store_dir);
                info!(root = ?root, "opening file store");
                Self {
                    fingerprints: Arc::new(FileFingerprintStore::new(&root, Arc::clone(&fs))),
                    objects: Arc::new(FileObjectStore::new(&root, entries.clone(), fs)),
                    entries,
                }
            }
            StoreMode::Memory => Self::in_memory(workdir, fs),
        }
    }

    /// Stores that live only as long as this handle (and its clones).
    pub fn in_memory(workdir: &Path, fs: Arc<dyn FileSystem>) -> Self {
        let entries = EntryBuilder::new(workdir, fs);
        debug!("opening in-memory store");
        Self {
            fingerprints: Arc::new(MemoryFingerprintStore::new()),
            objects: Arc::new(MemoryObjectStore::new(entries.clone())),
            entries,
        }
    }

    /// Assemble a handle from custom store implementations.
    pub fn from_parts(
        fingerprints: Arc<dyn FingerprintStore>,
        objects: Arc<dyn ObjectStore>,
        entries: EntryBuilder,
    ) -> Self {
        Self {
            fingerprints,
            objects,
            entries,
        }
    }

    pub fn fingerprints(&self) -> &dyn FingerprintStore {
        self.fingerprints.as_ref()
    }

    pub fn objects(&self) -> &dyn ObjectStore {
        self.objects.as_ref()
    }

    /// Resolves and hashes tracked files.
    pub fn entries(&self) -> &EntryBuilder {
        &self.entries
    }

    /// Remove both the fingerprint record and the stored object of `name`.
    /// Returns whether anything was removed.
    pub fn clear(&self, name: &str) -> Result<bool> {
        let had_record = self.fingerprints.clear(name)?;
        let had_object = self.objects.remove(name)?;
        Ok(had_record || had_object)
    }

    /// Remove only the fingerprint record, forcing a rebuild while keeping
    /// the last value readable.
    pub fn invalidate(&self, name: &str) -> Result<bool> {
        self.fingerprints.clear(name)
    }

    /// Names that have a record or an object, sorted and deduplicated.
    pub fn known_names(&self) -> Result<Vec<TargetName>> {
        let mut names = self.fingerprints.names()?;
        names.extend(self.objects.names()?);
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// End of run. Writes are already durable; this only marks the point
    /// after which the handle should not be used for the finished run.
    pub fn close(self) {
        debug!("closing store handle");
    }
}
