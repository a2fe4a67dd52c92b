//! Diagnostic reconciliation: lift blocks once the caller has looked around.
//!
//! A successful read/inspect/search call on a resource is evidence that the
//! decision-maker gathered new information about it. Failures on that same
//! resource whose code the diagnostic tool can plausibly resolve are marked
//! addressed. The pass never deletes records and never blocks anything.
//!
//! Which tools count as diagnostics, and what they resolve, is table-driven
//! ([`DiagnosticRegistry`]) so new tools need no change to the pass itself.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::fingerprint::Fingerprint;
use crate::core::resource::{is_descendant, normalize_resource, resource_from_map};
use crate::core::store::FailureStore;
use crate::core::types::{ErrorCode, ErrorInfo, TraceEntry};

/// One diagnostic tool and the failures it can resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticRule {
    /// Tool name as it appears in the trace.
    pub tool: String,
    /// Error codes a successful call can resolve.
    pub resolves: Vec<ErrorCode>,
    /// Parameter keys naming the inspected resource, tried in order.
    pub resource_keys: Vec<String>,
    /// Directory-style tools: also address failures on paths beneath the resource.
    #[serde(default)]
    pub match_descendants: bool,
}

impl DiagnosticRule {
    pub fn new(tool: &str, resolves: &[ErrorCode], resource_keys: &[&str]) -> Self {
        Self {
            tool: tool.to_string(),
            resolves: resolves.to_vec(),
            resource_keys: resource_keys.iter().map(|key| key.to_string()).collect(),
            match_descendants: false,
        }
    }

    pub fn descendants(mut self) -> Self {
        self.match_descendants = true;
        self
    }

    fn covers(&self, inspected: &str, failing: &str) -> bool {
        inspected == failing || (self.match_descendants && is_descendant(inspected, failing))
    }
}

/// Built-in diagnostic table for the common file tools.
pub fn default_rules() -> Vec<DiagnosticRule> {
    vec![
        DiagnosticRule::new(
            "read_file",
            &[ErrorCode::NotFound, ErrorCode::Conflict],
            &["file_path", "absolute_path", "path"],
        ),
        DiagnosticRule::new(
            "read_many_files",
            &[ErrorCode::NotFound, ErrorCode::Conflict],
            &["path", "file_path"],
        ),
        DiagnosticRule::new("list_directory", &[ErrorCode::NotFound], &["dir_path", "path"])
            .descendants(),
        DiagnosticRule::new("glob", &[ErrorCode::NotFound], &["dir_path", "path"]).descendants(),
        DiagnosticRule::new(
            "search_file_content",
            &[ErrorCode::NotFound, ErrorCode::Conflict],
            &["path", "file_path", "dir_path"],
        )
        .descendants(),
    ]
}

pub fn default_context_keys() -> Vec<String> {
    ["filePath", "file_path", "path"]
        .iter()
        .map(|key| key.to_string())
        .collect()
}

/// Lookup table from diagnostic tool name to its rule.
#[derive(Debug, Clone)]
pub struct DiagnosticRegistry {
    rules: HashMap<String, DiagnosticRule>,
    context_keys: Vec<String>,
}

impl DiagnosticRegistry {
    /// Empty registry. `context_keys` name the failing resource inside
    /// [`ErrorInfo::context`], tried in order.
    pub fn new(context_keys: Vec<String>) -> Self {
        Self {
            rules: HashMap::new(),
            context_keys,
        }
    }

    pub fn from_rules(rules: Vec<DiagnosticRule>, context_keys: Vec<String>) -> Self {
        let mut registry = Self::new(context_keys);
        for rule in rules {
            registry.register(rule);
        }
        registry
    }

    /// Add or replace the rule for `rule.tool`.
    pub fn register(&mut self, rule: DiagnosticRule) {
        self.rules.insert(rule.tool.clone(), rule);
    }

    pub fn rule_for(&self, tool: &str) -> Option<&DiagnosticRule> {
        self.rules.get(tool)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Failing resource named by a failure's context, normalized.
    pub fn context_resource(&self, error: &ErrorInfo) -> Option<String> {
        self.context_keys
            .iter()
            .filter_map(|key| error.context.get(key))
            .find_map(|value| value.as_str().and_then(normalize_resource))
    }

    fn inspected_resource(rule: &DiagnosticRule, parameters: &Value) -> Option<String> {
        parameters
            .as_object()
            .and_then(|map| resource_from_map(map, &rule.resource_keys))
    }
}

impl Default for DiagnosticRegistry {
    fn default() -> Self {
        Self::from_rules(default_rules(), default_context_keys())
    }
}

/// Mark failures addressed by successful diagnostic calls in `calls`.
///
/// Returns the fingerprints that transitioned to addressed, sorted. Records
/// that were already addressed are not reported again.
pub fn reconcile(
    store: &mut FailureStore,
    registry: &DiagnosticRegistry,
    calls: &[TraceEntry],
) -> Vec<Fingerprint> {
    let mut addressed = BTreeSet::new();

    for call in calls.iter().filter(|call| call.success) {
        let Some(rule) = registry.rule_for(&call.name) else {
            continue;
        };
        let Some(inspected) = DiagnosticRegistry::inspected_resource(rule, &call.parameters) else {
            continue;
        };

        for (fingerprint, record) in store.iter_mut() {
            if record.was_addressed
                || call.predates(record.recorded_at)
                || !rule.resolves.contains(&record.error.code)
            {
                continue;
            }
            let Some(failing) = registry.context_resource(&record.error) else {
                continue;
            };
            if rule.covers(&inspected, &failing) {
                record.was_addressed = true;
                addressed.insert(fingerprint.clone());
            }
        }
    }

    addressed.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fingerprint::fingerprint;
    use crate::core::types::FailureRecord;
    use serde_json::json;
    use std::time::{Duration, Instant};

    fn store_with(entries: Vec<(Fingerprint, ErrorInfo)>) -> FailureStore {
        let mut store = FailureStore::new(Duration::from_secs(300));
        let now = Instant::now();
        for (fp, error) in entries {
            store.insert(fp, FailureRecord::new(now, error));
        }
        store
    }

    fn missing(path: &str) -> ErrorInfo {
        ErrorInfo::new(ErrorCode::NotFound).with_context("filePath", path)
    }

    #[test]
    fn read_addresses_matching_resource_only() {
        let fp_a = fingerprint("replace", &json!({"file": "a.txt"}));
        let fp_b = fingerprint("replace", &json!({"file": "b.txt"}));
        let mut store = store_with(vec![
            (fp_a.clone(), missing("a.txt")),
            (fp_b.clone(), missing("b.txt")),
        ]);

        let addressed = reconcile(
            &mut store,
            &DiagnosticRegistry::default(),
            &[TraceEntry::new(
                "read_file",
                json!({"file_path": "a.txt"}),
                true,
            )],
        );

        assert_eq!(addressed, vec![fp_a.clone()]);
        assert!(store.get(&fp_a).expect("a").was_addressed);
        assert!(!store.get(&fp_b).expect("b").was_addressed);
    }

    #[test]
    fn failed_diagnostic_calls_are_ignored() {
        let fp = fingerprint("replace", &json!({"file": "a.txt"}));
        let mut store = store_with(vec![(fp.clone(), missing("a.txt"))]);
        let addressed = reconcile(
            &mut store,
            &DiagnosticRegistry::default(),
            &[TraceEntry::new("read_file", json!({"file_path": "a.txt"}), false)],
        );
        assert!(addressed.is_empty());
        assert!(!store.get(&fp).expect("record").was_addressed);
    }

    #[test]
    fn calls_observed_before_the_failure_do_not_address_it() {
        let fp = fingerprint("replace", &json!({"file": "a.txt"}));
        let recorded_at = Instant::now();
        let mut store = FailureStore::new(Duration::from_secs(300));
        store.insert(fp.clone(), FailureRecord::new(recorded_at, missing("a.txt")));
        let read = |at: Instant| {
            TraceEntry::new("read_file", json!({"file_path": "a.txt"}), true).observed_at(at)
        };

        let earlier = recorded_at - Duration::from_millis(5);
        let addressed = reconcile(&mut store, &DiagnosticRegistry::default(), &[read(earlier)]);
        assert!(addressed.is_empty());

        let addressed =
            reconcile(&mut store, &DiagnosticRegistry::default(), &[read(recorded_at)]);
        assert_eq!(addressed, vec![fp]);
    }

    #[test]
    fn unresolvable_codes_stay_blocked() {
        let fp = fingerprint("write_file", &json!({"file": "a.txt"}));
        let mut store = store_with(vec![(
            fp.clone(),
            ErrorInfo::new(ErrorCode::Permission).with_context("filePath", "a.txt"),
        )]);
        reconcile(
            &mut store,
            &DiagnosticRegistry::default(),
            &[TraceEntry::new("read_file", json!({"file_path": "a.txt"}), true)],
        );
        assert!(!store.get(&fp).expect("record").was_addressed);
    }

    #[test]
    fn non_diagnostic_tools_do_not_address() {
        let fp = fingerprint("replace", &json!({"file": "a.txt"}));
        let mut store = store_with(vec![(fp.clone(), missing("a.txt"))]);
        reconcile(
            &mut store,
            &DiagnosticRegistry::default(),
            &[TraceEntry::new("write_file", json!({"file_path": "a.txt"}), true)],
        );
        assert!(!store.get(&fp).expect("record").was_addressed);
    }

    #[test]
    fn resource_spellings_are_normalized() {
        let fp = fingerprint("replace", &json!({"file": "src/lib.rs"}));
        let mut store = store_with(vec![(fp.clone(), missing("./src//lib.rs"))]);
        let addressed = reconcile(
            &mut store,
            &DiagnosticRegistry::default(),
            &[TraceEntry::new("read_file", json!({"path": "src/lib.rs"}), true)],
        );
        assert_eq!(addressed, vec![fp]);
    }

    #[test]
    fn directory_listing_addresses_descendants() {
        let inside = fingerprint("replace", &json!({"file": "src/lib.rs"}));
        let outside = fingerprint("replace", &json!({"file": "tests/it.rs"}));
        let mut store = store_with(vec![
            (inside.clone(), missing("src/lib.rs")),
            (outside.clone(), missing("tests/it.rs")),
        ]);
        let addressed = reconcile(
            &mut store,
            &DiagnosticRegistry::default(),
            &[TraceEntry::new("list_directory", json!({"dir_path": "src"}), true)],
        );
        assert_eq!(addressed, vec![inside]);
        assert!(!store.get(&outside).expect("outside").was_addressed);
    }

    #[test]
    fn read_file_does_not_address_descendants() {
        let fp = fingerprint("replace", &json!({"file": "src/lib.rs"}));
        let mut store = store_with(vec![(fp.clone(), missing("src/lib.rs"))]);
        let addressed = reconcile(
            &mut store,
            &DiagnosticRegistry::default(),
            &[TraceEntry::new("read_file", json!({"file_path": "src"}), true)],
        );
        assert!(addressed.is_empty());
    }

    #[test]
    fn custom_rules_extend_the_table() {
        let fp = fingerprint("deploy", &json!({"service": "api"}));
        let mut store = store_with(vec![(
            fp.clone(),
            ErrorInfo::new("unhealthy").with_context("service", "api"),
        )]);
        let registry = DiagnosticRegistry::from_rules(
            vec![DiagnosticRule::new(
                "service_status",
                &[ErrorCode::from("unhealthy")],
                &["name"],
            )],
            vec!["service".to_string()],
        );
        let addressed = reconcile(
            &mut store,
            &registry,
            &[TraceEntry::new("service_status", json!({"name": "api"}), true)],
        );
        assert_eq!(addressed, vec![fp]);
    }

    #[test]
    fn already_addressed_records_are_not_reported() {
        let fp = fingerprint("replace", &json!({"file": "a.txt"}));
        let mut store = store_with(vec![(fp.clone(), missing("a.txt"))]);
        let read = [TraceEntry::new("read_file", json!({"file_path": "a.txt"}), true)];
        let registry = DiagnosticRegistry::default();
        assert_eq!(reconcile(&mut store, &registry, &read), vec![fp]);
        assert!(reconcile(&mut store, &registry, &read).is_empty());
    }
}
