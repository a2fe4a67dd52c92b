//! Resource identifier normalization for reconciliation matching.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

static REPEATED_SLASHES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/{2,}").expect("repeated slash pattern should be valid"));
static LEADING_CUR_DIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\./)+").expect("leading ./ pattern should be valid"));

/// Normalize a path-like identifier so equivalent spellings compare equal.
///
/// Returns `None` for blank input.
pub fn normalize_resource(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let collapsed = REPEATED_SLASHES.replace_all(trimmed, "/");
    let stripped = LEADING_CUR_DIR.replace(&collapsed, "");
    let mut normalized = stripped.into_owned();
    while normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    if normalized.is_empty() {
        normalized.push('.');
    }
    Some(normalized)
}

/// First string value found under `keys` (in key order), normalized.
pub fn resource_from_map(map: &Map<String, Value>, keys: &[String]) -> Option<String> {
    keys.iter()
        .filter_map(|key| map.get(key))
        .find_map(|value| value.as_str().and_then(normalize_resource))
}

/// True if `child` lies strictly beneath directory `parent`.
pub fn is_descendant(parent: &str, child: &str) -> bool {
    if parent == "." {
        return !child.starts_with('/') && child != ".";
    }
    if parent == "/" {
        return child.starts_with('/') && child != "/";
    }
    child
        .strip_prefix(parent)
        .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_equivalent_spellings() {
        assert_eq!(normalize_resource("a.txt"), Some("a.txt".to_string()));
        assert_eq!(normalize_resource("./a.txt"), Some("a.txt".to_string()));
        assert_eq!(normalize_resource(" src//lib.rs "), Some("src/lib.rs".to_string()));
        assert_eq!(normalize_resource("src/"), Some("src".to_string()));
        assert_eq!(normalize_resource("/"), Some("/".to_string()));
        assert_eq!(normalize_resource("./"), Some(".".to_string()));
    }

    #[test]
    fn normalize_blank_is_none() {
        assert_eq!(normalize_resource("   "), None);
    }

    #[test]
    fn resource_from_map_skips_non_strings() {
        let value = json!({"path": 3, "file_path": "./b.txt"});
        let map = value.as_object().expect("object");
        let keys = vec!["path".to_string(), "file_path".to_string()];
        assert_eq!(resource_from_map(map, &keys), Some("b.txt".to_string()));
    }

    #[test]
    fn descendant_requires_separator_boundary() {
        assert!(is_descendant("src", "src/lib.rs"));
        assert!(is_descendant("src", "src/core/mod.rs"));
        assert!(!is_descendant("src", "src"));
        assert!(!is_descendant("src", "srcx/lib.rs"));
        assert!(is_descendant(".", "lib.rs"));
        assert!(is_descendant("/", "/etc/hosts"));
    }
}
