//! Shared types for guard core logic.
//!
//! These types define the contracts between the tool layer (which classifies
//! failures), the guard (which tracks them), and the scheduler (which consumes
//! validation results). They carry no I/O and no clock of their own.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Failure classification supplied by the tool layer.
///
/// Serialized as a snake_case string. Unknown codes round-trip through
/// [`ErrorCode::Other`] so tool implementations can add kinds freely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorCode {
    Validation,
    Execution,
    Permission,
    NotFound,
    Conflict,
    Other(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::Validation => "validation",
            ErrorCode::Execution => "execution",
            ErrorCode::Permission => "permission",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::Other(code) => code,
        }
    }
}

impl From<&str> for ErrorCode {
    fn from(raw: &str) -> Self {
        match raw {
            "validation" => ErrorCode::Validation,
            "execution" => ErrorCode::Execution,
            "permission" => ErrorCode::Permission,
            "not_found" => ErrorCode::NotFound,
            "conflict" => ErrorCode::Conflict,
            other => ErrorCode::Other(other.to_string()),
        }
    }
}

impl From<String> for ErrorCode {
    fn from(raw: String) -> Self {
        ErrorCode::from(raw.as_str())
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        code.as_str().to_string()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified description of a tool failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    /// Free-form details. Must name the failing resource (e.g. `filePath`) for
    /// diagnostic reconciliation to find it.
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
    /// Ordered remediation hints for the decision-maker.
    #[serde(default, alias = "requiredActions")]
    pub required_actions: Vec<String>,
}

impl ErrorInfo {
    pub fn new(code: impl Into<ErrorCode>) -> Self {
        Self {
            code: code.into(),
            context: BTreeMap::new(),
            required_actions: Vec::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_required_action(mut self, action: impl Into<String>) -> Self {
        self.required_actions.push(action.into());
        self
    }
}

/// Most recent failure tracked for one fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureRecord {
    pub recorded_at: Instant,
    pub error: ErrorInfo,
    /// Set once diagnostic activity (or the caller) resolves the failure.
    /// Only a new failure on the same fingerprint resets it.
    pub was_addressed: bool,
}

impl FailureRecord {
    pub fn new(recorded_at: Instant, error: ErrorInfo) -> Self {
        Self {
            recorded_at,
            error,
            was_addressed: false,
        }
    }
}

/// Outcome of checking a tool call before dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub allowed: bool,
    pub reason: Option<String>,
    pub required_actions: Option<Vec<String>>,
    pub previous_failure: Option<FailureRecord>,
}

impl ValidationResult {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
            required_actions: None,
            previous_failure: None,
        }
    }

    pub fn blocked(reason: String, previous_failure: Option<FailureRecord>) -> Self {
        let required_actions = previous_failure
            .as_ref()
            .map(|record| record.error.required_actions.clone());
        Self {
            allowed: false,
            reason: Some(reason),
            required_actions,
            previous_failure,
        }
    }
}

/// One completed tool call, as reported by the scheduler for reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub name: String,
    #[serde(default)]
    pub parameters: Value,
    pub success: bool,
    /// When the scheduler saw the call complete. Untimed entries count as
    /// evidence against every record.
    #[serde(skip)]
    pub observed_at: Option<Instant>,
}

impl TraceEntry {
    pub fn new(name: impl Into<String>, parameters: Value, success: bool) -> Self {
        Self {
            name: name.into(),
            parameters,
            success,
            observed_at: None,
        }
    }

    pub fn observed_at(mut self, at: Instant) -> Self {
        self.observed_at = Some(at);
        self
    }

    /// Whether the call completed before `recorded_at`, so it cannot have
    /// looked at that failure.
    pub fn predates(&self, recorded_at: Instant) -> bool {
        self.observed_at.is_some_and(|at| at < recorded_at)
    }
}

/// Debug counters over the failure store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FailureStats {
    /// Records currently retained (addressed or not).
    pub total_failures: usize,
    /// Unaddressed records still inside the cooldown window.
    pub active_failures: usize,
    /// Records marked addressed but not yet purged.
    pub addressed_failures: usize,
}
