//! Logging setup for tests.

use tracing_subscriber::EnvFilter;

/// Directives used when `RUST_LOG` is not set.
///
/// Per-request failures are logged at `DEBUG` and worker state changes at `TRACE`, so the latter
/// stay off by default to keep load tests readable.
const DEFAULT_DIRECTIVES: &str = "ERROR,kvbench=DEBUG,kvbench_test=DEBUG";

/// Initialize the logger for testing.
///
/// Logs go to the output captured by the Rust test runner. Thread names are included since
/// workers of a run are spread over the runtime's threads. Calling this more than once is fine.
///
/// # Example
///
/// ```
/// kvbench_test::tracing::init();
/// ```
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    tracing_subscriber::fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_names(true)
        .with_test_writer()
        .compact()
        .try_init()
        .ok();
}
