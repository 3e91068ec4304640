//! Test-only helpers: canned agents, step and check builders, and a scratch
//! workspace.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::agent::Agent;
use crate::catalog::config_effect_id;
use crate::core::json::JsonValue;
use crate::core::registry::{CheckRegistry, PlanRegistry};
use crate::core::state::{ObservedStateSlice, Profile, StateSlice};
use crate::core::types::{
    ActionKind, ActionRef, CheckCategory, CheckResult, Effect, EffectKind, PlanStep, Severity,
};
use crate::io::config::{ReconcileConfig, write_config};
use crate::io::init::{InitOptions, ReconcilePaths, init_workspace};
use crate::io::profile_store::write_profile;
use crate::io::state_store::StateStore;

/// Agent returning canned state, checks and steps.
#[derive(Debug, Clone)]
pub struct StaticAgent {
    id: String,
    slice: Option<StateSlice>,
    fail_observe: bool,
    checks: Vec<CheckResult>,
    failing_checks: Vec<String>,
    steps: Vec<PlanStep>,
}

impl StaticAgent {
    /// Agent whose observed slice is empty (no data, no raw).
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            slice: None,
            fail_observe: false,
            checks: Vec::new(),
            failing_checks: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Agent whose `observe_state` errors.
    pub fn failing(id: &str) -> Self {
        Self {
            fail_observe: true,
            ..Self::new(id)
        }
    }

    /// Report `raw` as this agent's observed slice.
    pub fn with_raw(self, raw: JsonValue) -> Self {
        let slice = StateSlice::with_raw(&self.id, raw);
        self.with_slice(slice)
    }

    /// Report `slice` verbatim, even when its agent id differs from the agent's.
    pub fn with_slice(mut self, slice: StateSlice) -> Self {
        self.slice = Some(slice);
        self
    }

    pub fn with_check(mut self, check: CheckResult) -> Self {
        self.checks.push(check);
        self
    }

    /// Register a check whose closure errors with `message`.
    pub fn with_failing_check(mut self, message: &str) -> Self {
        self.failing_checks.push(message.to_string());
        self
    }

    pub fn with_step(mut self, step: PlanStep) -> Self {
        self.steps.push(step);
        self
    }
}

impl Agent for StaticAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn register_checks<'a>(&'a self, registry: &mut CheckRegistry<'a>) {
        for check in &self.checks {
            registry.register(check.key(), move || Ok(check.clone()));
        }
        for message in &self.failing_checks {
            registry.register(format!("{}/failing", self.id), move || Err(anyhow!("{message}")));
        }
    }

    fn register_plans<'a>(&'a self, registry: &mut PlanRegistry<'a>) {
        if !self.steps.is_empty() {
            registry.register(format!("{}/steps", self.id), move || Ok(self.steps.clone()));
        }
    }

    fn observe_state(&self) -> Result<ObservedStateSlice> {
        if self.fail_observe {
            return Err(anyhow!("agent {} unavailable", self.id));
        }
        Ok(self
            .slice
            .clone()
            .unwrap_or_else(|| StateSlice::empty(&self.id)))
    }
}

/// Check with the given severity and default category.
pub fn check(agent: &str, id: &str, severity: Severity) -> CheckResult {
    CheckResult::new(agent, id, severity, CheckCategory::Runtime)
}

/// Automated step referencing `action_id` with an empty config object.
pub fn automated_step(agent: &str, id: &str, action_id: &str) -> PlanStep {
    let effect = Effect::new(config_effect_id(action_id), EffectKind::Config, "{}");
    PlanStep::automated(agent, id, format!("{id} step"))
        .with_action(ActionRef::new(action_id, ActionKind::Setup))
        .with_effect(effect)
        .expect("single config effect")
}

/// Manual step with `reason`.
pub fn manual_step(agent: &str, id: &str, reason: &str) -> PlanStep {
    PlanStep::manual(agent, id, format!("{id} step"), reason).expect("manual reason")
}

/// Initialized workspace in a temporary directory.
pub struct TestWorkspace {
    temp: TempDir,
    pub paths: ReconcilePaths,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_workspace(temp.path(), &InitOptions { force: false }).expect("init");
        Self { temp, paths }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn write_config(&self, cfg: &ReconcileConfig) {
        write_config(&self.paths.config_path, cfg).expect("write config");
    }

    pub fn write_config_toml(&self, contents: &str) {
        std::fs::write(&self.paths.config_path, contents).expect("write config toml");
    }

    pub fn write_profile(&self, profile: &Profile) {
        let path = self.paths.profile_path(&ReconcileConfig::default());
        write_profile(&path, profile).expect("write profile");
    }

    /// Store observed state for `agent_id` in the default state directory.
    pub fn write_state(&self, agent_id: &str, value: &JsonValue) -> PathBuf {
        let store = StateStore::new(self.paths.state_dir(&ReconcileConfig::default()));
        store.write(agent_id, value).expect("write state")
    }

    /// Write an arbitrary file relative to the workspace root.
    pub fn write_file(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(&path, contents).expect("write file");
        path
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}
