//! Guard configuration stored as TOML (default `guard.toml`).

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::reconcile::{
    DiagnosticRegistry, DiagnosticRule, default_context_keys, default_rules,
};
use crate::guard::{DEFAULT_FAILURE_TIMEOUT, DEFAULT_MAX_FAILURE_AGE, GuardOptions};

pub const DEFAULT_CONFIG_FILE: &str = "guard.toml";

/// Guard configuration (TOML).
///
/// Missing fields default to the built-in policy: a 30 s cooldown, 5 min
/// retention and the stock file-tool diagnostic table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GuardConfig {
    /// Cooldown before an unaddressed failure stops blocking, in milliseconds.
    pub failure_timeout_ms: u64,

    /// Retention before a failure record is purged, in milliseconds.
    pub max_failure_age_ms: u64,

    /// Keys of a failure's context that name the failing resource, tried in order.
    pub context_resource_keys: Vec<String>,

    pub diagnostics: Vec<DiagnosticRule>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            failure_timeout_ms: millis(DEFAULT_FAILURE_TIMEOUT),
            max_failure_age_ms: millis(DEFAULT_MAX_FAILURE_AGE),
            context_resource_keys: default_context_keys(),
            diagnostics: default_rules(),
        }
    }
}

impl GuardConfig {
    pub fn validate(&self) -> Result<()> {
        if self.failure_timeout_ms == 0 {
            return Err(anyhow!("failure_timeout_ms must be > 0"));
        }
        if self.max_failure_age_ms == 0 {
            return Err(anyhow!("max_failure_age_ms must be > 0"));
        }
        if self.max_failure_age_ms < self.failure_timeout_ms {
            return Err(anyhow!(
                "max_failure_age_ms ({}) must be >= failure_timeout_ms ({})",
                self.max_failure_age_ms,
                self.failure_timeout_ms
            ));
        }
        if self.context_resource_keys.is_empty() {
            return Err(anyhow!("context_resource_keys must be a non-empty array"));
        }
        for (i, rule) in self.diagnostics.iter().enumerate() {
            if rule.tool.trim().is_empty() {
                return Err(anyhow!("diagnostics[{}].tool must be non-empty", i));
            }
            if rule.resolves.is_empty() {
                return Err(anyhow!(
                    "diagnostics[{}] ({}) must resolve at least one error code",
                    i,
                    rule.tool
                ));
            }
            if rule.resource_keys.is_empty() {
                return Err(anyhow!(
                    "diagnostics[{}] ({}) must name at least one resource key",
                    i,
                    rule.tool
                ));
            }
        }
        Ok(())
    }

    pub fn options(&self) -> GuardOptions {
        GuardOptions {
            failure_timeout: Duration::from_millis(self.failure_timeout_ms),
            max_failure_age: Duration::from_millis(self.max_failure_age_ms),
        }
    }

    pub fn registry(&self) -> DiagnosticRegistry {
        DiagnosticRegistry::from_rules(
            self.diagnostics.clone(),
            self.context_resource_keys.clone(),
        )
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `GuardConfig::default()`.
pub fn load_config(path: &Path) -> Result<GuardConfig> {
    if !path.exists() {
        let cfg = GuardConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: GuardConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &GuardConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
