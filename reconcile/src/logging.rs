//! Diagnostic tracing on stderr.
//!
//! Tracing is for operators debugging a run. Reports go to stdout and setup
//! receipts go to `.reconcile/runs/`; neither depends on `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "warn";

/// Install the global subscriber. Filter comes from `RUST_LOG`, else `warn`.
///
/// ```bash
/// RUST_LOG=reconcile=debug reconcile setup --apply
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}
