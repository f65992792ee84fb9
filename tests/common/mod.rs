#![allow(dead_code)]

pub use reprodag_test_utils::builders;
pub use reprodag_test_utils::fake_evaluator;
pub use reprodag_test_utils::{init_tracing, with_timeout, with_timeout_of};

use std::path::Path;
use std::sync::Arc;

use reprodag::engine::Engine;
use reprodag::fs::mock::MockFileSystem;
use reprodag::fs::RealFileSystem;
use reprodag::pipeline::Pipeline;
use reprodag::store::{DEFAULT_STORE_DIR, Store};
use reprodag::types::StoreMode;

use self::fake_evaluator::{FakeEvaluator, fake_dispatcher};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// In-memory store over a mock filesystem rooted at `/work`.
pub fn memory_store() -> Store {
    Store::in_memory(Path::new("/work"), Arc::new(MockFileSystem::new()))
}

/// On-disk store below `dir`, the way the CLI opens it.
pub fn file_store(dir: &Path) -> Store {
    Store::open(
        StoreMode::File,
        dir,
        Path::new(DEFAULT_STORE_DIR),
        Arc::new(RealFileSystem),
    )
}

/// Engine over `store` whose targets are evaluated by `evaluator`.
///
/// Building a new engine over the same store is how tests model a fresh
/// process picking up persisted state.
pub fn engine(pipeline: Pipeline, store: &Store, evaluator: &Arc<FakeEvaluator>) -> Engine {
    Engine::new(pipeline, store.clone(), fake_dispatcher(evaluator, "/work"))
        .expect("pipeline graph should build")
}

pub fn engine_in(
    dir: &Path,
    pipeline: Pipeline,
    store: &Store,
    evaluator: &Arc<FakeEvaluator>,
) -> Engine {
    Engine::new(pipeline, store.clone(), fake_dispatcher(evaluator, dir))
        .expect("pipeline graph should build")
}
