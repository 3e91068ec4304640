//! Workspace configuration stored under `.reconcile/config.toml`.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog;
use crate::io::files::write_atomic;

/// Reconcile configuration (TOML).
///
/// Edited by humans. Missing fields take the defaults below; relative paths
/// resolve against the workspace root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Desired-state profile (JSON). A missing file means no desired state.
    pub profile: String,

    /// Directory holding one observed-state JSON file per agent.
    pub state_dir: String,

    /// Directory receiving one subdirectory per setup run.
    pub runs_dir: String,

    /// Default deadline for `command.run` steps.
    pub command_timeout_secs: u64,

    /// Truncate captured command stdout/stderr beyond this many bytes.
    pub command_output_limit_bytes: usize,

    #[serde(rename = "agent", skip_serializing_if = "Vec::is_empty")]
    pub agents: Vec<AgentConfig>,
}

/// One configured agent (`[[agent]]`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub id: String,

    /// Explicit observed-state file. Defaults to `<state_dir>/<id>.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(default, rename = "task", skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskConfig>,
}

/// One remediation task (`[[agent.task]]`), rendered as a plan step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskConfig {
    pub id: String,

    /// Catalog action id. Required unless `manual_reason` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(default)]
    pub description: String,

    /// Marks the task as `manual_required`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_reason: Option<String>,

    /// Action config; decoded into the action's typed config struct.
    #[serde(default, skip_serializing_if = "toml::Table::is_empty")]
    pub config: toml::Table,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            profile: ".reconcile/profile.json".to_string(),
            state_dir: ".reconcile/state".to_string(),
            runs_dir: ".reconcile/runs".to_string(),
            command_timeout_secs: 5 * 60,
            command_output_limit_bytes: 100_000,
            agents: Vec::new(),
        }
    }
}

impl ReconcileConfig {
    pub fn validate(&self) -> Result<()> {
        if self.profile.trim().is_empty() {
            return Err(anyhow!("profile must be a non-empty path"));
        }
        if self.state_dir.trim().is_empty() {
            return Err(anyhow!("state_dir must be a non-empty path"));
        }
        if self.runs_dir.trim().is_empty() {
            return Err(anyhow!("runs_dir must be a non-empty path"));
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.command_output_limit_bytes == 0 {
            return Err(anyhow!("command_output_limit_bytes must be > 0"));
        }

        let mut agent_ids = HashSet::new();
        for agent in &self.agents {
            validate_agent_id(&agent.id)?;
            if !agent_ids.insert(agent.id.as_str()) {
                return Err(anyhow!("duplicate agent id '{}'", agent.id));
            }
            let mut task_ids = HashSet::new();
            for task in &agent.tasks {
                if task.id.trim().is_empty() {
                    return Err(anyhow!("agent '{}': task id must be non-empty", agent.id));
                }
                if !task_ids.insert(task.id.as_str()) {
                    return Err(anyhow!(
                        "agent '{}': duplicate task id '{}'",
                        agent.id,
                        task.id
                    ));
                }
                validate_task(&agent.id, task)?;
            }
        }
        Ok(())
    }
}

/// Agent ids double as state file names.
pub fn validate_agent_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(anyhow!("agent id must be non-empty"));
    }
    if id.starts_with('.') || id.contains(['/', '\\']) {
        return Err(anyhow!(
            "agent id '{id}' must not start with '.' or contain path separators"
        ));
    }
    Ok(())
}

fn validate_task(agent_id: &str, task: &TaskConfig) -> Result<()> {
    match (&task.manual_reason, &task.action) {
        (Some(reason), _) if reason.trim().is_empty() => Err(anyhow!(
            "agent '{agent_id}' task '{}': manual_reason must be non-empty",
            task.id
        )),
        (Some(_), None) => Ok(()),
        (_, None) => Err(anyhow!(
            "agent '{agent_id}' task '{}': action is required for automated tasks",
            task.id
        )),
        (_, Some(action)) if catalog::lookup(action).is_none() => Err(anyhow!(
            "agent '{agent_id}' task '{}': unknown action '{action}'",
            task.id
        )),
        _ => Ok(()),
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ReconcileConfig::default()`.
pub fn load_config(path: &Path) -> Result<ReconcileConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = ReconcileConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ReconcileConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    debug!(path = %path.display(), agents = cfg.agents.len(), "config loaded");
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ReconcileConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, action: Option<&str>, manual_reason: Option<&str>) -> TaskConfig {
        TaskConfig {
            id: id.to_string(),
            action: action.map(str::to_string),
            description: String::new(),
            manual_reason: manual_reason.map(str::to_string),
            config: toml::Table::new(),
        }
    }

    fn agent(id: &str, tasks: Vec<TaskConfig>) -> AgentConfig {
        AgentConfig {
            id: id.to_string(),
            state: None,
            tasks,
        }
    }

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ReconcileConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let mut snapshot = task("snap", Some(catalog::STATE_SNAPSHOT), None);
        snapshot
            .config
            .insert("agent_id".to_string(), toml::Value::String("disk".to_string()));
        let cfg = ReconcileConfig {
            agents: vec![agent(
                "disk",
                vec![snapshot, task("ask", None, Some("operator decides"))],
            )],
            ..ReconcileConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn parses_agent_and_task_tables() {
        let cfg: ReconcileConfig = toml::from_str(
            r#"
command_timeout_secs = 10

[[agent]]
id = "profile"
state = "observed/profile.json"

[[agent.task]]
id = "capture"
action = "state.snapshot"
description = "Capture profile state"
config = { agent_id = "profile", source = "live.json" }
"#,
        )
        .expect("parse");
        cfg.validate().expect("valid");
        assert_eq!(cfg.command_timeout_secs, 10);
        assert_eq!(cfg.state_dir, ".reconcile/state");
        assert_eq!(cfg.agents[0].tasks[0].config.len(), 2);
    }

    #[test]
    fn validate_errors_on_zero_timeout() {
        let cfg = ReconcileConfig {
            command_timeout_secs: 0,
            ..ReconcileConfig::default()
        };
        let err = cfg.validate().expect_err("zero timeout");
        assert!(err.to_string().contains("command_timeout_secs"));
    }

    #[test]
    fn validate_errors_on_duplicate_agent_id() {
        let cfg = ReconcileConfig {
            agents: vec![agent("a", Vec::new()), agent("a", Vec::new())],
            ..ReconcileConfig::default()
        };
        let err = cfg.validate().expect_err("duplicate");
        assert!(err.to_string().contains("duplicate agent id 'a'"));
    }

    #[test]
    fn validate_errors_on_unknown_action() {
        let cfg = ReconcileConfig {
            agents: vec![agent("a", vec![task("t", Some("nope.run"), None)])],
            ..ReconcileConfig::default()
        };
        let err = cfg.validate().expect_err("unknown action");
        assert!(err.to_string().contains("unknown action 'nope.run'"));
    }

    #[test]
    fn validate_errors_on_automated_task_without_action() {
        let cfg = ReconcileConfig {
            agents: vec![agent("a", vec![task("t", None, None)])],
            ..ReconcileConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_errors_on_path_like_agent_id() {
        assert!(validate_agent_id("../etc").is_err());
        assert!(validate_agent_id("a/b").is_err());
        assert!(validate_agent_id("disk").is_ok());
    }
}
