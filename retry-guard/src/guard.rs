//! Retry-loop guard: blocks immediate identical retries of failed tool calls.
//!
//! The scheduler asks [`RetryGuard::validate_before_execution`] (or
//! [`RetryGuard::admit`]) before dispatching a tool and reports the outcome
//! afterwards. A failed call stays blocked until one of:
//!
//! - the same call succeeds ([`RetryGuard::record_success`]),
//! - the failure is marked addressed, manually or by
//!   [`RetryGuard::detect_diagnostic_actions`],
//! - the cooldown window (`failure_timeout`) elapses.
//!
//! The guard is advisory. It never executes tools and never stops a scheduler
//! that chooses to ignore a block.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info};

use crate::core::clock::{Clock, SystemClock};
use crate::core::fingerprint::{Fingerprint, fingerprint};
use crate::core::reconcile::{DiagnosticRegistry, reconcile};
use crate::core::store::FailureStore;
use crate::core::types::{ErrorInfo, FailureRecord, FailureStats, TraceEntry, ValidationResult};

pub const DEFAULT_FAILURE_TIMEOUT: Duration = Duration::from_millis(30_000);
pub const DEFAULT_MAX_FAILURE_AGE: Duration = Duration::from_millis(300_000);

/// Time windows for the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardOptions {
    /// Cooldown after which an unaddressed failure no longer blocks.
    pub failure_timeout: Duration,
    /// Absolute retention; older records are purged on the next cleanup.
    pub max_failure_age: Duration,
}

impl Default for GuardOptions {
    fn default() -> Self {
        Self {
            failure_timeout: DEFAULT_FAILURE_TIMEOUT,
            max_failure_age: DEFAULT_MAX_FAILURE_AGE,
        }
    }
}

#[derive(Debug)]
struct GuardState {
    store: FailureStore,
    /// Live reservations, keyed by fingerprint, holding the permit's token.
    in_flight: HashMap<Fingerprint, u64>,
    /// Never reset, so a permit that outlives `clear_all` cannot release a
    /// newer reservation.
    next_token: u64,
}

/// Failure tracker owned by one scheduler (typically one per session).
///
/// All methods take `&self`; state lives behind a mutex so the guard can be
/// shared across dispatch threads.
#[derive(Debug)]
pub struct RetryGuard<C: Clock = SystemClock> {
    options: GuardOptions,
    registry: DiagnosticRegistry,
    clock: C,
    state: Mutex<GuardState>,
}

impl RetryGuard<SystemClock> {
    pub fn new(options: GuardOptions) -> Self {
        Self::with_clock(options, SystemClock)
    }
}

impl Default for RetryGuard<SystemClock> {
    fn default() -> Self {
        Self::new(GuardOptions::default())
    }
}

impl<C: Clock> RetryGuard<C> {
    pub fn with_clock(options: GuardOptions, clock: C) -> Self {
        Self {
            options,
            registry: DiagnosticRegistry::default(),
            clock,
            state: Mutex::new(GuardState {
                store: FailureStore::new(options.max_failure_age),
                in_flight: HashMap::new(),
                next_token: 0,
            }),
        }
    }

    /// Replace the diagnostic table used by reconciliation.
    pub fn with_registry(mut self, registry: DiagnosticRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn options(&self) -> GuardOptions {
        self.options
    }

    pub fn registry(&self) -> &DiagnosticRegistry {
        &self.registry
    }

    /// Decide whether an invocation may proceed.
    ///
    /// An identical call currently held by an [`InFlight`] permit is blocked.
    pub fn validate_before_execution(
        &self,
        tool_name: &str,
        parameters: &Value,
    ) -> ValidationResult {
        let fp = fingerprint(tool_name, parameters);
        let now = self.clock.now();
        let mut state = self.lock();
        Self::purge(&mut state, now);
        if let Some(blocked) = Self::in_flight_block(&state, tool_name, &fp) {
            return blocked;
        }
        self.decide(tool_name, state.store.get(&fp), now)
    }

    /// Validate and reserve the call in one step.
    ///
    /// While the returned permit lives, an identical call is refused, so two
    /// concurrent retries of the same failing call cannot both be admitted.
    pub fn admit(&self, tool_name: &str, parameters: &Value) -> Admission<'_, C> {
        let fp = fingerprint(tool_name, parameters);
        let now = self.clock.now();
        let mut state = self.lock();
        Self::purge(&mut state, now);

        if let Some(blocked) = Self::in_flight_block(&state, tool_name, &fp) {
            return Admission::Blocked(blocked);
        }

        let result = self.decide(tool_name, state.store.get(&fp), now);
        if !result.allowed {
            return Admission::Blocked(result);
        }
        let token = state.next_token;
        state.next_token += 1;
        state.in_flight.insert(fp.clone(), token);
        Admission::Admitted(InFlight {
            guard: self,
            fingerprint: fp,
            token,
            released: false,
        })
    }

    /// Record a failure, replacing any earlier record and clearing its addressed flag.
    pub fn record_failure(&self, tool_name: &str, parameters: &Value, error: ErrorInfo) {
        self.record_failure_for(fingerprint(tool_name, parameters), error);
    }

    /// Clear any failure history for the identical call.
    pub fn record_success(&self, tool_name: &str, parameters: &Value) {
        self.record_success_for(&fingerprint(tool_name, parameters));
    }

    /// Mark the failure as resolved. No-op when nothing is recorded.
    pub fn mark_failure_addressed(&self, tool_name: &str, parameters: &Value) {
        let fp = fingerprint(tool_name, parameters);
        let mut state = self.lock();
        if let Some(record) = state.store.get_mut(&fp) {
            record.was_addressed = true;
            debug!(fingerprint = %fp, "failure marked addressed");
        }
    }

    /// Run diagnostic reconciliation over a trace of recent calls.
    ///
    /// Returns the fingerprints newly marked addressed.
    pub fn detect_diagnostic_actions(&self, recent_calls: &[TraceEntry]) -> Vec<Fingerprint> {
        let now = self.clock.now();
        let mut state = self.lock();
        Self::purge(&mut state, now);
        let addressed = reconcile(&mut state.store, &self.registry, recent_calls);
        for fp in &addressed {
            info!(fingerprint = %fp, "diagnostic activity addressed failure");
        }
        addressed
    }

    /// Current record for a call, if any. Does not run cleanup.
    pub fn failure_for(&self, tool_name: &str, parameters: &Value) -> Option<FailureRecord> {
        let fp = fingerprint(tool_name, parameters);
        self.lock().store.get(&fp).cloned()
    }

    pub fn failure_stats(&self) -> FailureStats {
        let now = self.clock.now();
        let mut state = self.lock();
        Self::purge(&mut state, now);

        let mut stats = FailureStats {
            total_failures: state.store.len(),
            ..FailureStats::default()
        };
        for (_, record) in state.store.iter() {
            if record.was_addressed {
                stats.addressed_failures += 1;
            } else if now.saturating_duration_since(record.recorded_at)
                < self.options.failure_timeout
            {
                stats.active_failures += 1;
            }
        }
        stats
    }

    /// Forget every record and in-flight reservation.
    ///
    /// Permits issued before the clear stay valid for reporting outcomes, but
    /// dropping them no longer touches reservations made afterwards.
    pub fn clear_all(&self) {
        let mut state = self.lock();
        state.store.clear();
        state.in_flight.clear();
        debug!("guard state cleared");
    }

    fn record_failure_for(&self, fp: Fingerprint, error: ErrorInfo) {
        let now = self.clock.now();
        debug!(fingerprint = %fp, code = %error.code, "recording failure");
        self.lock().store.insert(fp, FailureRecord::new(now, error));
    }

    fn record_success_for(&self, fp: &Fingerprint) {
        if self.lock().store.remove(fp).is_some() {
            debug!(fingerprint = %fp, "success cleared failure");
        }
    }

    fn release(&self, fp: &Fingerprint, token: u64) {
        let mut state = self.lock();
        if state.in_flight.get(fp) == Some(&token) {
            state.in_flight.remove(fp);
        }
    }

    fn in_flight_block(
        state: &GuardState,
        tool_name: &str,
        fp: &Fingerprint,
    ) -> Option<ValidationResult> {
        if !state.in_flight.contains_key(fp) {
            return None;
        }
        info!(tool = tool_name, fingerprint = %fp, "identical call already in flight");
        Some(ValidationResult::blocked(
            format!(
                "An identical '{}' call is already in flight. Wait for its result before retrying.",
                tool_name
            ),
            state.store.get(fp).cloned(),
        ))
    }

    fn decide(
        &self,
        tool_name: &str,
        record: Option<&FailureRecord>,
        now: Instant,
    ) -> ValidationResult {
        let Some(record) = record else {
            return ValidationResult::allowed();
        };
        if record.was_addressed {
            return ValidationResult::allowed();
        }
        let elapsed = now.saturating_duration_since(record.recorded_at);
        if elapsed >= self.options.failure_timeout {
            return ValidationResult::allowed();
        }

        let remaining = self.options.failure_timeout - elapsed;
        let reason = format!(
            "'{}' failed {}s ago with identical parameters ({}). Retrying unchanged will fail again; \
             perform one of the required actions first, or wait {}s.",
            tool_name,
            elapsed.as_secs(),
            record.error.code,
            remaining.as_secs().max(1),
        );
        info!(
            tool = tool_name,
            elapsed_secs = elapsed.as_secs(),
            code = %record.error.code,
            "blocked identical retry"
        );
        ValidationResult::blocked(reason, Some(record.clone()))
    }

    fn purge(state: &mut GuardState, now: Instant) {
        let removed = state.store.cleanup(now);
        if removed > 0 {
            debug!(removed, remaining = state.store.len(), "purged expired failures");
        }
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        // Every critical section leaves the state consistent, so a poisoned
        // lock still holds usable data.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Result of [`RetryGuard::admit`].
#[derive(Debug)]
pub enum Admission<'a, C: Clock> {
    Admitted(InFlight<'a, C>),
    Blocked(ValidationResult),
}

impl<C: Clock> Admission<'_, C> {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted(_))
    }
}

/// Reservation for an admitted call.
///
/// Report the outcome with [`InFlight::succeeded`] or [`InFlight::failed`].
/// Dropping the permit without reporting releases the reservation and records
/// nothing (e.g. the scheduler cancelled the call).
#[derive(Debug)]
pub struct InFlight<'a, C: Clock> {
    guard: &'a RetryGuard<C>,
    fingerprint: Fingerprint,
    token: u64,
    released: bool,
}

impl<C: Clock> InFlight<'_, C> {
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn succeeded(mut self) {
        self.guard.record_success_for(&self.fingerprint);
        self.finish();
    }

    pub fn failed(mut self, error: ErrorInfo) {
        self.guard.record_failure_for(self.fingerprint.clone(), error);
        self.finish();
    }

    fn finish(&mut self) {
        if !self.released {
            self.guard.release(&self.fingerprint, self.token);
            self.released = true;
        }
    }
}

impl<C: Clock> Drop for InFlight<'_, C> {
    fn drop(&mut self) {
        self.finish();
    }
}
