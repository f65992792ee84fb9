// tests/store_io.rs
//
// Store IO performed by workers while a run is in progress.

mod common;
use crate::common::builders::PipelineBuilder;
use crate::common::fake_evaluator::FakeEvaluator;
use crate::common::{TestResult, engine, init_tracing};

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;

use reprodag::engine::RunOptions;
use reprodag::errors::Result;
use reprodag::fingerprint::MemoryFingerprintStore;
use reprodag::fs::FileSystem;
use reprodag::fs::mock::MockFileSystem;
use reprodag::pipeline::Target;
use reprodag::report::TargetOutcome;
use reprodag::store::{EntryBuilder, MemoryObjectStore, ObjectEntry, ObjectStore, Store};
use reprodag::types::{ErrorPolicy, StorageFormat, TargetName};

/// In-memory objects that remember which thread each write ran on.
#[derive(Debug)]
struct ThreadRecordingObjects {
    inner: MemoryObjectStore,
    writers: Mutex<Vec<ThreadId>>,
}

impl ObjectStore for ThreadRecordingObjects {
    fn write(
        &self,
        name: &str,
        value: &serde_json::Value,
        format: StorageFormat,
    ) -> Result<ObjectEntry> {
        self.writers.lock().unwrap().push(std::thread::current().id());
        self.inner.write(name, value, format)
    }

    fn entry(&self, name: &str) -> Result<Option<ObjectEntry>> {
        self.inner.entry(name)
    }

    fn remove(&self, name: &str) -> Result<bool> {
        self.inner.remove(name)
    }

    fn names(&self) -> Result<Vec<TargetName>> {
        self.inner.names()
    }
}

#[tokio::test]
async fn object_writes_run_off_the_runtime_thread() -> TestResult {
    init_tracing();
    let fs: Arc<dyn FileSystem> = Arc::new(MockFileSystem::new());
    let entries = EntryBuilder::new(Path::new("/work"), Arc::clone(&fs));
    let objects = Arc::new(ThreadRecordingObjects {
        inner: MemoryObjectStore::new(entries.clone()),
        writers: Mutex::new(Vec::new()),
    });
    let store = Store::from_parts(
        Arc::new(MemoryFingerprintStore::new()),
        objects.clone(),
        entries,
    );

    let eval = FakeEvaluator::new();
    eval.set_failure("fallback", "no data");
    let pipeline = PipelineBuilder::new()
        .target("raw", "load()")
        .target("clean", "tidy(raw)")
        .with_target(Target::new("fallback", "guess()").error_policy(ErrorPolicy::SubstituteDefault))
        .build();

    let report = engine(pipeline, &store, &eval).run(&RunOptions::all()).await?;
    assert_eq!(report.count(TargetOutcome::Built), 3);

    // The test body and every spawned task share this thread under the
    // current-thread runtime.
    let runtime_thread = std::thread::current().id();
    let writers = objects.writers.lock().unwrap();
    assert_eq!(writers.len(), 3);
    assert!(writers.iter().all(|id| *id != runtime_thread));
    Ok(())
}
