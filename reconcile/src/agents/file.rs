//! Agent backed by one observed-state JSON file and configured tasks.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, warn};

use crate::agent::Agent;
use crate::catalog::{self, STATE_CLEAR, STATE_SNAPSHOT};
use crate::core::json::{JsonObject, JsonValue};
use crate::core::registry::{CheckRegistry, PlanRegistry};
use crate::core::state::{ObservedStateSlice, StateSlice};
use crate::core::types::{
    ActionKind, ActionRef, CheckCategory, CheckResult, EvidenceItem, PlanStep, Severity,
};
use crate::io::config::TaskConfig;
use crate::io::state_store::read_json_file;

/// Id of the health check every file agent registers.
pub const STATE_FILE_CHECK: &str = "state_file";

/// Reports the parsed contents of `state_path` as its raw observed slice.
#[derive(Debug, Clone)]
pub struct FileStateAgent {
    id: String,
    state_path: PathBuf,
    tasks: Vec<TaskConfig>,
}

impl FileStateAgent {
    pub fn new(id: impl Into<String>, state_path: impl Into<PathBuf>, tasks: Vec<TaskConfig>) -> Self {
        Self {
            id: id.into(),
            state_path: state_path.into(),
            tasks,
        }
    }

    fn state_file_check(&self) -> CheckResult {
        let mut check = CheckResult::new(
            &self.id,
            STATE_FILE_CHECK,
            Severity::Pass,
            CheckCategory::Filesystem,
        );
        let mut evidence = EvidenceItem {
            id: "state_path".to_string(),
            kind: "file".to_string(),
            path: Some(self.state_path.display().to_string()),
            details: None,
        };
        match read_json_file(&self.state_path) {
            Ok(Some(_)) => {}
            Ok(None) => {
                check.severity = Severity::Warn;
                check.suggested_actions = vec![
                    ActionRef::new(STATE_SNAPSHOT, ActionKind::Setup)
                        .with_description(format!("Capture observed state for {}", self.id)),
                ];
            }
            Err(err) => {
                check.severity = Severity::Fail;
                let mut details = JsonObject::new();
                details.insert("error".to_string(), JsonValue::String(format!("{err:#}")));
                evidence.details = Some(JsonValue::Object(details));
                check.suggested_actions = vec![
                    ActionRef::new(STATE_CLEAR, ActionKind::Repair)
                        .with_description(format!("Discard unreadable state for {}", self.id)),
                ];
            }
        }
        check.evidence.push(evidence);
        check
    }
}

impl Agent for FileStateAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn register_checks<'a>(&'a self, registry: &mut CheckRegistry<'a>) {
        registry.register(format!("{}/{STATE_FILE_CHECK}", self.id), move || {
            Ok(self.state_file_check())
        });
    }

    fn register_plans<'a>(&'a self, registry: &mut PlanRegistry<'a>) {
        for task in &self.tasks {
            registry.register(format!("{}/{}", self.id, task.id), move || {
                Ok(vec![task_step(&self.id, task)?])
            });
        }
    }

    fn observe_state(&self) -> Result<ObservedStateSlice> {
        match read_json_file(&self.state_path) {
            Ok(Some(value)) => Ok(StateSlice::with_raw(&self.id, value)),
            Ok(None) => {
                debug!(agent = %self.id, path = %self.state_path.display(), "no observed state");
                Ok(StateSlice::empty(&self.id))
            }
            Err(err) => {
                // Surfaced by the state_file check.
                warn!(agent = %self.id, error = %format!("{err:#}"), "observed state unreadable");
                Ok(StateSlice::empty(&self.id))
            }
        }
    }
}

/// Render a configured task as a plan step.
pub fn task_step(agent_id: &str, task: &TaskConfig) -> Result<PlanStep> {
    let description = if task.description.trim().is_empty() {
        match &task.action {
            Some(action) => format!("Run {action} for {agent_id}"),
            None => format!("Manual task {} for {agent_id}", task.id),
        }
    } else {
        task.description.clone()
    };

    let mut step = match &task.manual_reason {
        Some(reason) => PlanStep::manual(agent_id, &task.id, description, reason)?,
        None => PlanStep::automated(agent_id, &task.id, description),
    };

    if let Some(action_id) = &task.action {
        let spec = catalog::lookup(action_id)
            .ok_or_else(|| anyhow!("task {agent_id}/{}: unknown action '{action_id}'", task.id))?;
        let config = serde_json::to_value(&task.config)
            .with_context(|| format!("task {agent_id}/{}: convert config", task.id))?;
        let effect = catalog::build_config_effect(action_id, config)
            .with_context(|| format!("task {agent_id}/{}", task.id))?;
        step = step
            .with_action(ActionRef::new(spec.id, spec.kind).with_description(spec.description))
            .with_effect(effect)?;
    }
    Ok(step)
}
