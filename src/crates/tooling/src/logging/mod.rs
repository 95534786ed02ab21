//! Logging bootstrap and helpers
//!
//! One `tracing-subscriber` initialization shared by binaries and tests,
//! driven by `RUST_LOG` with a sensible default.

use std::time::Instant;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// Respects `RUST_LOG`; falls back to the given default directive.
/// Safe to call more than once (later calls are no-ops).
pub fn init_logging(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Log the execution time of a future at debug level
pub async fn timed<F, T>(name: &str, future: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = Instant::now();
    let result = future.await;
    debug!(operation = name, elapsed = ?start.elapsed(), "completed");
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timed_passes_through_result() {
        let value = timed("addition", async { 2 + 2 }).await;
        assert_eq!(value, 4);
    }

    #[test]
    fn init_is_idempotent() {
        init_logging("debug");
        init_logging("info");
    }
}
