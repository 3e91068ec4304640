//! Frozen action catalog, typed action configs and the setup allowlist.
//!
//! Every executable action has an entry here and a typed config struct; a
//! plan step's `config` effect is only ever produced by serializing one of
//! those structs, never from hand-built JSON.

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::json::JsonValue;
use crate::core::types::{ActionKind, Effect, EffectKind};

pub const STATE_SNAPSHOT: &str = "state.snapshot";
pub const STATE_VERIFY: &str = "state.verify";
pub const STATE_CLEAR: &str = "state.clear";
pub const COMMAND_RUN: &str = "command.run";

/// Description carried by every config effect.
pub const CONFIG_EFFECT_DESCRIPTION: &str = "service_config";

/// Static description of one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionSpec {
    pub id: &'static str,
    pub kind: ActionKind,
    pub description: &'static str,
    pub config_keys: &'static [&'static str],
    /// Safe to run during `setup --apply` without per-step confirmation.
    pub enabled_in_setup: bool,
}

pub const CATALOG: &[ActionSpec] = &[
    ActionSpec {
        id: STATE_SNAPSHOT,
        kind: ActionKind::Setup,
        description: "Copy a JSON document into the observed-state store",
        config_keys: &["agent_id", "source", "state_dir"],
        enabled_in_setup: true,
    },
    ActionSpec {
        id: STATE_VERIFY,
        kind: ActionKind::Recheck,
        description: "Verify that an agent's stored observed state parses",
        config_keys: &["agent_id", "state_dir"],
        enabled_in_setup: true,
    },
    ActionSpec {
        id: STATE_CLEAR,
        kind: ActionKind::Repair,
        description: "Delete an agent's stored observed state",
        config_keys: &["agent_id", "state_dir"],
        enabled_in_setup: false,
    },
    ActionSpec {
        id: COMMAND_RUN,
        kind: ActionKind::Setup,
        description: "Run an external command with a timeout",
        config_keys: &["program", "args", "workdir", "timeout_secs"],
        enabled_in_setup: false,
    },
];

pub fn lookup(id: &str) -> Option<&'static ActionSpec> {
    CATALOG.iter().find(|spec| spec.id == id)
}

pub fn action_ids() -> BTreeSet<&'static str> {
    CATALOG.iter().map(|spec| spec.id).collect()
}

/// Action ids that `setup --apply` may run unattended.
pub fn setup_allowlist() -> BTreeSet<String> {
    CATALOG
        .iter()
        .filter(|spec| spec.enabled_in_setup)
        .map(|spec| spec.id.to_string())
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    #[error("invalid config for action '{action}': {source}")]
    InvalidConfig {
        action: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Typed configuration for one catalog action.
pub trait ActionConfig: Serialize + DeserializeOwned {
    const ACTION_ID: &'static str;

    /// Render the `config` effect for this action.
    fn to_effect(&self) -> Result<Effect, CatalogError> {
        let value = serde_json::to_value(self).map_err(|source| CatalogError::InvalidConfig {
            action: Self::ACTION_ID.to_string(),
            source,
        })?;
        let target = JsonValue::from(value).to_json_string();
        Ok(Effect::new(config_effect_id(Self::ACTION_ID), EffectKind::Config, target)
            .with_description(CONFIG_EFFECT_DESCRIPTION))
    }
}

/// `state.snapshot` -> `state_snapshot_config`.
pub fn config_effect_id(action_id: &str) -> String {
    format!("{}_config", action_id.replace('.', "_"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateSnapshotConfig {
    pub agent_id: String,
    /// Path of the JSON document to store.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<String>,
}

impl ActionConfig for StateSnapshotConfig {
    const ACTION_ID: &'static str = STATE_SNAPSHOT;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateVerifyConfig {
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<String>,
}

impl ActionConfig for StateVerifyConfig {
    const ACTION_ID: &'static str = STATE_VERIFY;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateClearConfig {
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<String>,
}

impl ActionConfig for StateClearConfig {
    const ACTION_ID: &'static str = STATE_CLEAR;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandRunConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ActionConfig for CommandRunConfig {
    const ACTION_ID: &'static str = COMMAND_RUN;
}

/// Decode an untyped config table into the action's typed struct and render
/// its `config` effect. Unknown actions and unknown keys are rejected.
pub fn build_config_effect(action_id: &str, config: serde_json::Value) -> Result<Effect, CatalogError> {
    match action_id {
        STATE_SNAPSHOT => decode::<StateSnapshotConfig>(config)?.to_effect(),
        STATE_VERIFY => decode::<StateVerifyConfig>(config)?.to_effect(),
        STATE_CLEAR => decode::<StateClearConfig>(config)?.to_effect(),
        COMMAND_RUN => decode::<CommandRunConfig>(config)?.to_effect(),
        other => Err(CatalogError::UnknownAction(other.to_string())),
    }
}

fn decode<C: ActionConfig>(config: serde_json::Value) -> Result<C, CatalogError> {
    serde_json::from_value(config).map_err(|source| CatalogError::InvalidConfig {
        action: C::ACTION_ID.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn catalog_ids_are_unique() {
        assert_eq!(action_ids().len(), CATALOG.len());
    }

    #[test]
    fn allowlist_is_non_empty_and_catalogued() {
        let allowlist = setup_allowlist();
        assert!(!allowlist.is_empty());
        for id in &allowlist {
            assert!(lookup(id).is_some(), "{id} missing from catalog");
        }
    }

    #[test]
    fn config_effect_target_has_sorted_keys_and_drops_absent() {
        let effect = StateSnapshotConfig {
            agent_id: "a".to_string(),
            source: "in.json".to_string(),
            state_dir: None,
        }
        .to_effect()
        .expect("effect");
        assert_eq!(effect.id, "state_snapshot_config");
        assert_eq!(effect.kind, EffectKind::Config);
        assert_eq!(effect.description.as_deref(), Some(CONFIG_EFFECT_DESCRIPTION));
        assert_eq!(effect.target, r#"{"agent_id":"a","source":"in.json"}"#);
    }

    #[test]
    fn build_config_effect_rejects_unknown_keys() {
        let err = build_config_effect(STATE_VERIFY, json!({"agent_id": "a", "bogus": 1}))
            .expect_err("unknown key");
        assert!(matches!(err, CatalogError::InvalidConfig { .. }));
    }

    #[test]
    fn build_config_effect_rejects_unknown_action() {
        let err = build_config_effect("docs.a.x", json!({})).expect_err("unknown action");
        assert!(matches!(err, CatalogError::UnknownAction(ref id) if id == "docs.a.x"));
    }

    #[test]
    fn command_config_defaults_args() {
        let effect = build_config_effect(COMMAND_RUN, json!({"program": "true"})).expect("effect");
        assert_eq!(effect.target, r#"{"args":[],"program":"true"}"#);
    }
}
