//! Retry-loop guard for agent tool dispatch.
//!
//! An agent that reissues a failing tool call unchanged gathers no new
//! information and fails forever. This crate tracks recent failures by a
//! stable call identity and blocks identical retries until the failure is
//! addressed, the call succeeds, or a cooldown elapses. The architecture
//! enforces a strict separation:
//!
//! - **[`core`]**: Pure logic (fingerprints, the failure store, diagnostic
//!   reconciliation). No I/O; time enters through an injected clock.
//! - **[`io`]**: Side-effecting helpers (TOML config, JSONL traces, directive
//!   templates).
//!
//! [`guard::RetryGuard`] is the entry point for schedulers. [`replay`] drives it
//! over recorded traces for the `retry-guard` CLI.

pub mod core;
pub mod exit_codes;
pub mod guard;
pub mod io;
pub mod logging;
pub mod replay;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
