//! Shared helpers for reprodag's integration tests.

pub mod builders;
pub mod fake_evaluator;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Variable that selects test log levels, like `REPRODAG_LOG` does for the
/// binary.
pub const TEST_LOG_ENV: &str = "REPRODAG_TEST_LOG";

/// Budget for tests that only use the fake evaluator.
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialise tracing for tests.
///
/// Output goes through `with_test_writer()`, so it only shows for failing
/// tests (or with `-- --nocapture`). Engine logs default to `debug` and
/// everything else to `warn`; override with e.g.
/// `REPRODAG_TEST_LOG=reprodag=trace cargo test`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(TEST_LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new("reprodag=debug,warn"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Run a future within [`DEFAULT_TEST_TIMEOUT`].
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    with_timeout_of(DEFAULT_TEST_TIMEOUT, f).await
}

/// Run a future within `limit`. Tests that spawn real processes use a
/// larger budget than [`DEFAULT_TEST_TIMEOUT`].
pub async fn with_timeout_of<F, T>(limit: Duration, f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(limit, f).await {
        Ok(out) => out,
        Err(_) => panic!("pipeline test did not finish within {limit:?}"),
    }
}
