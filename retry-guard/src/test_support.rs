//! Test-only helpers for driving the guard and writing trace fixtures.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;

use crate::core::clock::ManualClock;
use crate::core::types::{ErrorCode, ErrorInfo};
use crate::guard::{GuardOptions, RetryGuard};

/// Guard with default options on a manual clock, plus a handle to that clock.
pub fn manual_guard() -> (RetryGuard<ManualClock>, ManualClock) {
    manual_guard_with(GuardOptions::default())
}

pub fn manual_guard_with(options: GuardOptions) -> (RetryGuard<ManualClock>, ManualClock) {
    let clock = ManualClock::new();
    (RetryGuard::with_clock(options, clock.clone()), clock)
}

/// `not_found` failure on `path` with a single remediation hint.
pub fn not_found(path: &str, action: &str) -> ErrorInfo {
    ErrorInfo::new(ErrorCode::NotFound)
        .with_context("filePath", path)
        .with_required_action(action)
}

/// Temporary directory holding a JSONL trace (and optionally a config).
///
/// The directory is removed when the fixture drops.
pub struct TraceFixture {
    dir: tempfile::TempDir,
    trace_path: PathBuf,
}

impl TraceFixture {
    pub fn new(events: &[Value]) -> Result<Self> {
        let dir = tempfile::tempdir().context("create trace tempdir")?;
        let trace_path = dir.path().join("trace.jsonl");
        let mut buf = String::new();
        for event in events {
            buf.push_str(&event.to_string());
            buf.push('\n');
        }
        fs::write(&trace_path, buf)
            .with_context(|| format!("write trace {}", trace_path.display()))?;
        Ok(Self { dir, trace_path })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn trace_path(&self) -> &Path {
        &self.trace_path
    }

    /// Write `contents` as `guard.toml` next to the trace and return its path.
    pub fn write_config(&self, contents: &str) -> Result<PathBuf> {
        let path = self.dir.path().join("guard.toml");
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}
