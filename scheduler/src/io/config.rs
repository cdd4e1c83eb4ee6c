//! Scheduler configuration stored under `.scheduler/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Scheduler configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable
/// and automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Default `max_attempts` for newly added tasks.
    pub max_attempts_default: u32,

    /// Per-task wall-clock budget for assistant execution, in seconds.
    pub task_timeout_secs: u64,

    /// Fixed pause between tasks within one run, in seconds.
    pub pause_between_tasks_secs: u64,

    /// Truncate captured assistant stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Base directory for task workspaces.
    pub workspace_root: String,

    /// Directory holding named prompt and workspace templates.
    pub templates_dir: String,

    pub quota: QuotaConfig,
    pub assistant: AssistantConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QuotaConfig {
    /// Fraction of quota at which a warning is logged.
    pub warning_threshold: f64,
    /// Fraction of quota at which task execution is refused.
    pub critical_threshold: f64,
    /// Upper bound on waiting for a quota reset, in seconds.
    pub max_wait_secs: u64,
    /// Default sleep between reset polls, in seconds.
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssistantConfig {
    /// Command used to invoke the external assistant (e.g. `["claude"]`).
    pub command: Vec<String>,
    /// Pass the skip-permissions flag so the assistant never blocks on
    /// interactive approval.
    pub auto_accept: bool,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            warning_threshold: 0.8,
            critical_threshold: 0.95,
            max_wait_secs: 6 * 3600,
            poll_interval_secs: 300,
        }
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            command: vec!["claude".to_string()],
            auto_accept: true,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_attempts_default: 3,
            task_timeout_secs: 300,
            pause_between_tasks_secs: 2,
            output_limit_bytes: 100_000,
            workspace_root: "workspaces".to_string(),
            templates_dir: "templates".to_string(),
            quota: QuotaConfig::default(),
            assistant: AssistantConfig::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.task_timeout_secs == 0 {
            return Err(anyhow!("task_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.assistant.command.is_empty() || self.assistant.command[0].trim().is_empty() {
            return Err(anyhow!("assistant.command must be a non-empty array"));
        }
        if !(0.0..=1.0).contains(&self.quota.warning_threshold)
            || !(0.0..=1.0).contains(&self.quota.critical_threshold)
        {
            return Err(anyhow!("quota thresholds must be within 0.0..=1.0"));
        }
        if self.quota.warning_threshold > self.quota.critical_threshold {
            return Err(anyhow!(
                "quota.warning_threshold must not exceed quota.critical_threshold"
            ));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SchedulerConfig::default()`.
pub fn load_config(path: &Path) -> Result<SchedulerConfig> {
    if !path.exists() {
        let cfg = SchedulerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SchedulerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SchedulerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, SchedulerConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let mut cfg = SchedulerConfig::default();
        cfg.assistant.command = vec!["claude".to_string(), "--model".to_string()];
        cfg.quota.critical_threshold = 0.9;
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let mut cfg = SchedulerConfig::default();
        cfg.quota.warning_threshold = 0.99;
        cfg.quota.critical_threshold = 0.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_empty_assistant_command() {
        let mut cfg = SchedulerConfig::default();
        cfg.assistant.command = Vec::new();
        assert!(cfg.validate().is_err());
    }
}
