//! Opt-in tracing output for test suites.
//!
//! The library only emits `tracing` events; nothing is printed unless a
//! subscriber is installed. `RunContext::debug` raises per-chunk events from
//! `trace` to `debug`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter: warnings from everything, plus this crate's `debug` events
/// so `RunContext::debug` output shows without setting `RUST_LOG`.
pub const DEFAULT_FILTER: &str = "warn,spawn_harness=debug";

/// Install a compact stderr subscriber filtered by `RUST_LOG`
/// (default [`DEFAULT_FILTER`]).
///
/// Writes through libtest's capture so output only shows for failing tests.
/// Safe to call from every test: later calls are no-ops.
///
/// # Example
/// ```bash
/// RUST_LOG=spawn_harness=debug cargo test -- --nocapture
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_test_writer().compact())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
