//! Subscriber setup for the `retry-guard` binary.
//!
//! The library only emits `tracing` events: blocked retries and reconciliation
//! at `info`, record bookkeeping and purges at `debug`. A scheduler embedding
//! [`crate::guard::RetryGuard`] routes them through its own subscriber and never
//! calls [`init`]. Replay reports go to stdout and are unaffected by filtering.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install a stderr subscriber filtered by `RUST_LOG` (default `warn`).
///
/// To see each blocked call during a replay:
/// ```bash
/// RUST_LOG=retry_guard::guard=info retry-guard replay trace.jsonl
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
