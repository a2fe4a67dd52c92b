//! Orchestration for `retry-guard replay`.
//!
//! Replays a recorded tool-call trace through a guard driven by a manual clock
//! set from each event's `at_ms`. Calls the guard would have blocked are
//! reported and, like a scheduler honoring the block, not recorded. Turn ends
//! run diagnostic reconciliation over the calls executed since the last turn;
//! a diagnostic only counts against failures recorded at or before its own
//! `at_ms`.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::core::clock::{Clock, ManualClock};
use crate::core::fingerprint::fingerprint;
use crate::core::types::{FailureStats, TraceEntry};
use crate::guard::{Admission, RetryGuard};
use crate::io::config::GuardConfig;
use crate::io::directive::DirectiveRenderer;
use crate::io::trace::{CallOutcome, TraceEvent, TraceLine, load_trace};

/// A call the guard refused during replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedCall {
    pub line: usize,
    pub at_ms: u64,
    pub tool: String,
    pub fingerprint: String,
    pub reason: String,
    pub required_actions: Vec<String>,
    /// Rendered message the decision-maker would have received.
    pub directive: String,
}

/// A failure lifted by reconciliation at a turn end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressedFailure {
    pub line: usize,
    pub at_ms: u64,
    pub fingerprint: String,
}

/// Summary of a replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayOutcome {
    pub calls: usize,
    pub executed: usize,
    pub blocked: Vec<BlockedCall>,
    pub addressed: Vec<AddressedFailure>,
    pub stats: FailureStats,
}

impl ReplayOutcome {
    pub fn has_blocked(&self) -> bool {
        !self.blocked.is_empty()
    }
}

/// Load a trace from disk and replay it.
pub fn replay_file(path: &Path, config: &GuardConfig) -> Result<ReplayOutcome> {
    let lines = load_trace(path)?;
    replay(&lines, config).with_context(|| format!("replay {}", path.display()))
}

/// Replay parsed trace events against a fresh guard built from `config`.
pub fn replay(lines: &[TraceLine], config: &GuardConfig) -> Result<ReplayOutcome> {
    config.validate()?;
    let clock = ManualClock::new();
    let guard =
        RetryGuard::with_clock(config.options(), clock.clone()).with_registry(config.registry());
    let renderer = DirectiveRenderer::new()?;

    let mut outcome = ReplayOutcome {
        calls: 0,
        executed: 0,
        blocked: Vec::new(),
        addressed: Vec::new(),
        stats: FailureStats::default(),
    };
    let mut turn: Vec<TraceEntry> = Vec::new();

    for TraceLine { line, event } in lines {
        let at_ms = event.at_ms();
        clock.set_elapsed(Duration::from_millis(at_ms));

        match event {
            TraceEvent::Call {
                name,
                parameters,
                outcome: call_outcome,
                ..
            } => {
                outcome.calls += 1;
                match guard.admit(name, parameters) {
                    Admission::Admitted(permit) => {
                        outcome.executed += 1;
                        match call_outcome {
                            CallOutcome::Success => permit.succeeded(),
                            CallOutcome::Failure { error } => permit.failed(error.clone()),
                        }
                        if let Some(entry) = event.to_entry() {
                            turn.push(entry.observed_at(clock.now()));
                        }
                    }
                    Admission::Blocked(result) => {
                        let directive = renderer
                            .render(name, &result, guard.registry())?
                            .unwrap_or_default();
                        info!(line, tool = %name, "replayed call would be blocked");
                        outcome.blocked.push(BlockedCall {
                            line: *line,
                            at_ms,
                            tool: name.clone(),
                            fingerprint: fingerprint(name, parameters).to_string(),
                            reason: result.reason.clone().unwrap_or_default(),
                            required_actions: result.required_actions.clone().unwrap_or_default(),
                            directive,
                        });
                    }
                }
            }
            TraceEvent::TurnEnd { .. } => {
                let addressed = guard.detect_diagnostic_actions(&turn);
                debug!(line, calls = turn.len(), addressed = addressed.len(), "turn reconciled");
                outcome
                    .addressed
                    .extend(addressed.into_iter().map(|fp| AddressedFailure {
                        line: *line,
                        at_ms,
                        fingerprint: fp.to_string(),
                    }));
                turn.clear();
            }
        }
    }

    outcome.stats = guard.failure_stats();
    Ok(outcome)
}

/// Human-readable replay report.
pub fn render_report(outcome: &ReplayOutcome) -> String {
    let mut buf = format!(
        "calls: {} (executed {}, blocked {})\n",
        outcome.calls,
        outcome.executed,
        outcome.blocked.len()
    );
    for blocked in &outcome.blocked {
        buf.push_str(&format!(
            "\nline {} @ {}ms: blocked {}\n{}\n",
            blocked.line, blocked.at_ms, blocked.fingerprint, blocked.directive
        ));
    }
    if !outcome.addressed.is_empty() {
        buf.push('\n');
        for addressed in &outcome.addressed {
            buf.push_str(&format!(
                "line {} @ {}ms: addressed {}\n",
                addressed.line, addressed.at_ms, addressed.fingerprint
            ));
        }
    }
    buf.push_str(&format!(
        "\nfailures: {} tracked, {} active, {} addressed\n",
        outcome.stats.total_failures,
        outcome.stats.active_failures,
        outcome.stats.addressed_failures
    ));
    buf
}
