//! Shared deterministic types for checks, plan steps and actions.
//!
//! Wire names are snake_case and absent optionals are omitted on encode, so
//! serialized reports stay byte-stable for identical inputs.

use serde::{Deserialize, Serialize};

use crate::core::json::JsonValue;

/// Health severity of a check. Sweep output orders `fail`, then `warn`, then `pass`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Pass,
    #[default]
    Warn,
    Fail,
}

impl Severity {
    /// Sort rank used by the sweep: lower ranks come first.
    pub fn rank(self) -> u8 {
        match self {
            Severity::Fail => 0,
            Severity::Warn => 1,
            Severity::Pass => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Pass => "pass",
            Severity::Warn => "warn",
            Severity::Fail => "fail",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CheckCategory {
    Audio,
    Plugin,
    Midi,
    Filesystem,
    Policy,
    Ui,
    Automation,
    #[default]
    Runtime,
}

impl CheckCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckCategory::Audio => "audio",
            CheckCategory::Plugin => "plugin",
            CheckCategory::Midi => "midi",
            CheckCategory::Filesystem => "filesystem",
            CheckCategory::Policy => "policy",
            CheckCategory::Ui => "ui",
            CheckCategory::Automation => "automation",
            CheckCategory::Runtime => "runtime",
        }
    }
}

/// Kind of a suggested or invoked action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Setup,
    Repair,
    Recheck,
    Open,
    Docs,
    Manual,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Setup => "setup",
            ActionKind::Repair => "repair",
            ActionKind::Recheck => "recheck",
            ActionKind::Open => "open",
            ActionKind::Docs => "docs",
            ActionKind::Manual => "manual",
        }
    }
}

/// Reference to an action by catalog id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRef {
    pub id: String,
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ActionRef {
    pub fn new(id: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            id: id.into(),
            kind,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    Filesystem,
    Config,
    Device,
    Process,
    Ui,
}

/// Declared side effect of a plan step.
///
/// A `config` effect carries the action's typed configuration as a JSON object
/// string in `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    pub id: String,
    pub kind: EffectKind,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Effect {
    pub fn new(id: impl Into<String>, kind: EffectKind, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            target: target.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

/// Outcome of one health check, keyed by `(agent, id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub id: String,
    pub agent: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub category: CheckCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<JsonValue>,
    #[serde(default)]
    pub evidence: Vec<EvidenceItem>,
    #[serde(default)]
    pub suggested_actions: Vec<ActionRef>,
}

impl CheckResult {
    pub fn new(
        agent: impl Into<String>,
        id: impl Into<String>,
        severity: Severity,
        category: CheckCategory,
    ) -> Self {
        Self {
            id: id.into(),
            agent: agent.into(),
            severity,
            category,
            observed: None,
            expected: None,
            evidence: Vec::new(),
            suggested_actions: Vec::new(),
        }
    }

    /// `<agent>/<id>`, the uniqueness key within one sweep.
    pub fn key(&self) -> String {
        format!("{}/{}", self.agent, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanStepType {
    Automated,
    #[default]
    ManualRequired,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanStepError {
    #[error("plan step {agent}/{id}: manual_required step needs a non-empty manual_reason")]
    MissingManualReason { agent: String, id: String },
    #[error("plan step {agent}/{id}: at most one config effect is allowed")]
    DuplicateConfigEffect { agent: String, id: String },
}

/// One remediation step.
///
/// Fields are private so a `manual_required` step can only exist with a
/// non-empty `manual_reason`, whether built in code or decoded from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PlanStepRecord")]
pub struct PlanStep {
    id: String,
    agent: String,
    #[serde(rename = "type")]
    step_type: PlanStepType,
    description: String,
    effects: Vec<Effect>,
    idempotent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    manual_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    action_ref: Option<ActionRef>,
}

/// Wire shape of a plan step before validation.
#[derive(Debug, Deserialize)]
struct PlanStepRecord {
    id: String,
    agent: String,
    #[serde(rename = "type", default)]
    step_type: PlanStepType,
    description: String,
    #[serde(default)]
    effects: Vec<Effect>,
    #[serde(default = "default_idempotent")]
    idempotent: bool,
    #[serde(default)]
    manual_reason: Option<String>,
    #[serde(default)]
    action_ref: Option<ActionRef>,
}

fn default_idempotent() -> bool {
    true
}

impl TryFrom<PlanStepRecord> for PlanStep {
    type Error = PlanStepError;

    fn try_from(record: PlanStepRecord) -> Result<Self, Self::Error> {
        let step = PlanStep {
            id: record.id,
            agent: record.agent,
            step_type: record.step_type,
            description: record.description,
            effects: record.effects,
            idempotent: record.idempotent,
            manual_reason: record.manual_reason,
            action_ref: record.action_ref,
        };
        step.validate()?;
        Ok(step)
    }
}

impl PlanStep {
    /// Automated step with no effects and no action reference yet.
    pub fn automated(
        agent: impl Into<String>,
        id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            agent: agent.into(),
            step_type: PlanStepType::Automated,
            description: description.into(),
            effects: Vec::new(),
            idempotent: true,
            manual_reason: None,
            action_ref: None,
        }
    }

    /// Manual step; fails when `reason` is blank.
    pub fn manual(
        agent: impl Into<String>,
        id: impl Into<String>,
        description: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<Self, PlanStepError> {
        let step = Self {
            id: id.into(),
            agent: agent.into(),
            step_type: PlanStepType::ManualRequired,
            description: description.into(),
            effects: Vec::new(),
            idempotent: true,
            manual_reason: Some(reason.into()),
            action_ref: None,
        };
        step.validate()?;
        Ok(step)
    }

    pub fn with_action(mut self, action: ActionRef) -> Self {
        self.action_ref = Some(action);
        self
    }

    pub fn with_idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    /// Attach an effect; a second `config` effect is rejected.
    pub fn with_effect(mut self, effect: Effect) -> Result<Self, PlanStepError> {
        self.effects.push(effect);
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), PlanStepError> {
        if self.step_type == PlanStepType::ManualRequired
            && self
                .manual_reason
                .as_deref()
                .is_none_or(|reason| reason.trim().is_empty())
        {
            return Err(PlanStepError::MissingManualReason {
                agent: self.agent.clone(),
                id: self.id.clone(),
            });
        }
        let config_effects = self
            .effects
            .iter()
            .filter(|effect| effect.kind == EffectKind::Config)
            .count();
        if config_effects > 1 {
            return Err(PlanStepError::DuplicateConfigEffect {
                agent: self.agent.clone(),
                id: self.id.clone(),
            });
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn step_type(&self) -> PlanStepType {
        self.step_type
    }

    pub fn is_manual(&self) -> bool {
        self.step_type == PlanStepType::ManualRequired
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn idempotent(&self) -> bool {
        self.idempotent
    }

    pub fn manual_reason(&self) -> Option<&str> {
        self.manual_reason.as_deref()
    }

    pub fn action_ref(&self) -> Option<&ActionRef> {
        self.action_ref.as_ref()
    }

    /// The step's single `config` effect, if any.
    pub fn config_effect(&self) -> Option<&Effect> {
        self.effects
            .iter()
            .find(|effect| effect.kind == EffectKind::Config)
    }

    /// `<agent>/<id>`, used in logs and failure lines.
    pub fn key(&self) -> String {
        format!("{}/{}", self.agent, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_step_requires_reason() {
        let err = PlanStep::manual("a", "s", "desc", "  ").expect_err("blank reason");
        assert_eq!(
            err,
            PlanStepError::MissingManualReason {
                agent: "a".to_string(),
                id: "s".to_string()
            }
        );
        assert!(PlanStep::manual("a", "s", "desc", "needs human").is_ok());
    }

    #[test]
    fn decode_applies_defaults() {
        let step: PlanStep = serde_json::from_str(
            r#"{"id":"s","agent":"a","description":"d","manual_reason":"why"}"#,
        )
        .expect("decode");
        assert_eq!(step.step_type(), PlanStepType::ManualRequired);
        assert!(step.effects().is_empty());
        assert!(step.idempotent());
        assert_eq!(step.manual_reason(), Some("why"));
    }

    #[test]
    fn decode_rejects_manual_step_without_reason() {
        let err = serde_json::from_str::<PlanStep>(
            r#"{"id":"s","agent":"a","type":"manual_required","description":"d"}"#,
        )
        .expect_err("missing reason");
        assert!(err.to_string().contains("manual_reason"), "{err}");
    }

    #[test]
    fn decode_rejects_blank_manual_reason() {
        let blank = r#"{"id":"s","agent":"a","type":"manual_required","description":"d","manual_reason":" \t"}"#;
        assert!(serde_json::from_str::<PlanStep>(blank).is_err());
    }

    #[test]
    fn decode_rejects_defaulted_type_without_reason() {
        assert!(serde_json::from_str::<PlanStep>(r#"{"id":"s","agent":"a","description":"d"}"#).is_err());
    }

    #[test]
    fn second_config_effect_is_rejected() {
        let step = PlanStep::automated("a", "s", "d")
            .with_effect(Effect::new("c1", EffectKind::Config, "{}"))
            .expect("first config");
        let err = step
            .with_effect(Effect::new("c2", EffectKind::Config, "{}"))
            .expect_err("second config");
        assert!(matches!(err, PlanStepError::DuplicateConfigEffect { .. }));
    }

    #[test]
    fn step_encodes_snake_case_and_omits_absent_optionals() {
        let step = PlanStep::automated("a", "s", "d")
            .with_action(ActionRef::new("state.verify", ActionKind::Recheck));
        let json = serde_json::to_string(&step).expect("encode");
        assert_eq!(
            json,
            r#"{"id":"s","agent":"a","type":"automated","description":"d","effects":[],"idempotent":true,"action_ref":{"id":"state.verify","kind":"recheck"}}"#
        );
    }

    #[test]
    fn check_decode_applies_defaults() {
        let check: CheckResult =
            serde_json::from_str(r#"{"id":"c","agent":"a"}"#).expect("decode");
        assert_eq!(check.severity, Severity::Warn);
        assert_eq!(check.category, CheckCategory::Runtime);
        assert!(check.evidence.is_empty());
        assert!(check.suggested_actions.is_empty());
        assert_eq!(check.key(), "a/c");
    }

    #[test]
    fn severity_rank_puts_fail_first() {
        assert!(Severity::Fail.rank() < Severity::Warn.rank());
        assert!(Severity::Warn.rank() < Severity::Pass.rank());
    }
}
