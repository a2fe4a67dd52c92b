//! JSONL tool-call traces consumed by `retry-guard replay`.
//!
//! One event per line. Each line is checked against the embedded v1 schema
//! before it is deserialized, so malformed traces fail with the line number
//! and the schema violation instead of a bare serde message.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::{Draft, Validator};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::core::types::{ErrorInfo, TraceEntry};

pub const TRACE_EVENT_SCHEMA: &str = include_str!("../../schemas/trace_event.v1.schema.json");

/// One recorded event in a tool-call trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEvent {
    /// A completed tool call.
    Call {
        at_ms: u64,
        name: String,
        #[serde(default)]
        parameters: Value,
        outcome: CallOutcome,
    },
    /// End of a decision-maker turn; triggers diagnostic reconciliation.
    TurnEnd { at_ms: u64 },
}

impl TraceEvent {
    pub fn at_ms(&self) -> u64 {
        match self {
            TraceEvent::Call { at_ms, .. } | TraceEvent::TurnEnd { at_ms } => *at_ms,
        }
    }

    /// Reconciliation view of a call event.
    pub fn to_entry(&self) -> Option<TraceEntry> {
        match self {
            TraceEvent::Call {
                name,
                parameters,
                outcome,
                ..
            } => Some(TraceEntry::new(
                name.clone(),
                parameters.clone(),
                matches!(outcome, CallOutcome::Success),
            )),
            TraceEvent::TurnEnd { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CallOutcome {
    Success,
    Failure { error: ErrorInfo },
}

/// Trace event with its 1-indexed source line.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceLine {
    pub line: usize,
    pub event: TraceEvent,
}

/// Load and validate a JSONL trace from disk.
pub fn load_trace(path: &Path) -> Result<Vec<TraceLine>> {
    debug!(path = %path.display(), "loading trace");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read trace {}", path.display()))?;
    parse_trace(&contents).with_context(|| format!("parse trace {}", path.display()))
}

/// Parse JSONL trace contents. Blank lines are skipped.
///
/// Timestamps must be non-decreasing.
pub fn parse_trace(contents: &str) -> Result<Vec<TraceLine>> {
    let validator = compile_schema()?;
    let mut lines = Vec::new();
    let mut last_at = 0u64;

    for (idx, raw) in contents.lines().enumerate() {
        let line = idx + 1;
        if raw.trim().is_empty() {
            continue;
        }
        let value: Value =
            serde_json::from_str(raw).with_context(|| format!("line {}: invalid json", line))?;
        let messages: Vec<String> = validator
            .iter_errors(&value)
            .map(|err| err.to_string())
            .collect();
        if !messages.is_empty() {
            bail!(
                "line {}: schema validation failed:\n- {}",
                line,
                messages.join("\n- ")
            );
        }
        let event: TraceEvent = serde_json::from_value(value)
            .with_context(|| format!("line {}: deserialize trace event", line))?;
        if event.at_ms() < last_at {
            bail!(
                "line {}: at_ms {} goes backwards (previous event at {})",
                line,
                event.at_ms(),
                last_at
            );
        }
        last_at = event.at_ms();
        lines.push(TraceLine { line, event });
    }

    debug!(events = lines.len(), "trace parsed");
    Ok(lines)
}

fn compile_schema() -> Result<Validator> {
    let schema: Value =
        serde_json::from_str(TRACE_EVENT_SCHEMA).context("parse trace event schema")?;
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| anyhow!("compile trace event schema: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ErrorCode;
    use serde_json::json;

    #[test]
    fn parses_calls_and_turn_ends() {
        let contents = [
            json!({"type": "call", "at_ms": 0, "name": "replace", "parameters": {"file": "a"},
                   "outcome": {"status": "failure", "error": {"code": "not_found",
                   "context": {"filePath": "a"}, "requiredActions": ["read file first"]}}}),
            json!({"type": "call", "at_ms": 10, "name": "read_file",
                   "parameters": {"file_path": "a"}, "outcome": {"status": "success"}}),
            json!({"type": "turn_end", "at_ms": 10}),
        ]
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join("\n\n");

        let lines = parse_trace(&contents).expect("parse");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].line, 3);
        assert_eq!(lines[2].event, TraceEvent::TurnEnd { at_ms: 10 });
        match &lines[0].event {
            TraceEvent::Call {
                outcome: CallOutcome::Failure { error },
                ..
            } => {
                assert_eq!(error.code, ErrorCode::NotFound);
                assert_eq!(error.required_actions, vec!["read file first".to_string()]);
            }
            other => panic!("unexpected event {other:?}"),
        }
        let entry = lines[1].event.to_entry().expect("entry");
        assert!(entry.success);
        assert_eq!(entry.name, "read_file");
    }

    #[test]
    fn missing_parameters_default_to_null() {
        let lines = parse_trace(
            r#"{"type":"call","at_ms":1,"name":"ls","outcome":{"status":"success"}}"#,
        )
        .expect("parse");
        match &lines[0].event {
            TraceEvent::Call { parameters, .. } => assert_eq!(parameters, &Value::Null),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn schema_violation_names_the_line() {
        let contents = "{\"type\":\"turn_end\",\"at_ms\":0}\n{\"type\":\"call\",\"at_ms\":1}";
        let err = parse_trace(contents).expect_err("invalid");
        let message = format!("{:#}", err);
        assert!(message.contains("line 2"), "{message}");
        assert!(message.contains("schema validation failed"), "{message}");
    }

    #[test]
    fn failure_without_error_is_rejected() {
        let contents = r#"{"type":"call","at_ms":0,"name":"x","outcome":{"status":"failure"}}"#;
        assert!(parse_trace(contents).is_err());
    }

    #[test]
    fn both_required_action_spellings_fail_schema_validation() {
        let contents = r#"{"type":"call","at_ms":0,"name":"x","outcome":{"status":"failure","error":{"code":"not_found","required_actions":["a"],"requiredActions":["b"]}}}"#;
        let message = format!("{:#}", parse_trace(contents).expect_err("invalid"));
        assert!(message.contains("schema validation failed"), "{message}");
        assert!(!message.contains("duplicate field"), "{message}");
    }

    #[test]
    fn timestamps_must_not_go_backwards() {
        let contents = "{\"type\":\"turn_end\",\"at_ms\":5}\n{\"type\":\"turn_end\",\"at_ms\":4}";
        let err = parse_trace(contents).expect_err("invalid");
        assert!(err.to_string().contains("goes backwards"));
    }

    #[test]
    fn invalid_json_names_the_line() {
        let err = parse_trace("{not json").expect_err("invalid");
        assert!(err.to_string().contains("line 1"));
    }
}
