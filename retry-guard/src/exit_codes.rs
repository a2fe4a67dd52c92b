//! Stable exit codes for retry-guard CLI commands.

/// Command succeeded; a replayed trace had no blocked calls.
pub const OK: i32 = 0;
/// Command failed due to invalid config, trace, or arguments.
pub const INVALID: i32 = 1;
/// `retry-guard replay` found at least one call the guard would have blocked.
pub const BLOCKED: i32 = 2;
