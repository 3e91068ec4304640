//! Observed and desired state slices plus the desired `Profile`.

use serde::{Deserialize, Serialize};

use crate::core::json::{JsonObject, JsonValue};

/// Agent id used for the desired slice rendered from the profile.
pub const PROFILE_AGENT_ID: &str = "profile";

/// One agent's portion of a state snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSlice {
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<JsonValue>,
}

pub type ObservedStateSlice = StateSlice;
pub type DesiredStateSlice = StateSlice;

impl StateSlice {
    /// Slice with neither `data` nor `raw`.
    pub fn empty(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            data: None,
            raw: None,
        }
    }

    pub fn with_data(agent_id: impl Into<String>, data: JsonObject) -> Self {
        Self {
            agent_id: agent_id.into(),
            data: Some(data),
            raw: None,
        }
    }

    pub fn with_raw(agent_id: impl Into<String>, raw: JsonValue) -> Self {
        Self {
            agent_id: agent_id.into(),
            data: None,
            raw: Some(raw),
        }
    }

    /// Value reported in check payloads: `raw` if present, else `data` as an object.
    pub fn payload(&self) -> Option<JsonValue> {
        if let Some(raw) = &self.raw {
            return Some(raw.clone());
        }
        self.data.clone().map(JsonValue::Object)
    }

    /// Structural equality of both `data` and `raw`.
    pub fn matches(&self, other: &StateSlice) -> bool {
        self.agent_id == other.agent_id && self.data == other.data && self.raw == other.raw
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObservedState {
    pub slices: Vec<ObservedStateSlice>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DesiredState {
    pub slices: Vec<DesiredStateSlice>,
}

impl ObservedState {
    pub fn slice(&self, agent_id: &str) -> Option<&ObservedStateSlice> {
        self.slices.iter().find(|slice| slice.agent_id == agent_id)
    }
}

/// Desired configuration supplied by the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub intents: Vec<String>,
    #[serde(default)]
    pub policies: JsonObject,
    #[serde(default)]
    pub requirements: JsonObject,
    #[serde(default)]
    pub packs: Vec<String>,
}

impl Profile {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            intents: Vec::new(),
            policies: JsonObject::new(),
            requirements: JsonObject::new(),
            packs: Vec::new(),
        }
    }
}

/// Render the profile as the desired slice for agent `"profile"`.
///
/// `raw` holds `{id, intents, policies, requirements, packs}`; `data` is absent.
pub fn profile_slice(profile: &Profile) -> DesiredStateSlice {
    let mut raw = JsonObject::new();
    raw.insert("id".to_string(), JsonValue::String(profile.id.clone()));
    raw.insert("intents".to_string(), JsonValue::string_list(&profile.intents));
    raw.insert(
        "policies".to_string(),
        JsonValue::Object(profile.policies.clone()),
    );
    raw.insert(
        "requirements".to_string(),
        JsonValue::Object(profile.requirements.clone()),
    );
    raw.insert("packs".to_string(), JsonValue::string_list(&profile.packs));
    StateSlice::with_raw(PROFILE_AGENT_ID, JsonValue::Object(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_slice_renders_raw_object() {
        let mut profile = Profile::new("hvlien");
        profile.intents = vec!["live".to_string()];
        profile.packs = vec!["core".to_string()];
        let slice = profile_slice(&profile);

        assert_eq!(slice.agent_id, PROFILE_AGENT_ID);
        assert!(slice.data.is_none());
        let raw = slice.raw.expect("raw");
        assert_eq!(
            raw.to_json_string(),
            r#"{"id":"hvlien","intents":["live"],"packs":["core"],"policies":{},"requirements":{}}"#
        );
    }

    #[test]
    fn payload_prefers_raw_then_data() {
        let mut data = JsonObject::new();
        data.insert("k".to_string(), JsonValue::Bool(true));
        let mut slice = StateSlice::with_data("a", data.clone());
        assert_eq!(slice.payload(), Some(JsonValue::Object(data)));

        slice.raw = Some(JsonValue::from("raw"));
        assert_eq!(slice.payload(), Some(JsonValue::from("raw")));

        assert_eq!(StateSlice::empty("a").payload(), None);
    }

    #[test]
    fn matches_compares_data_and_raw() {
        let left = StateSlice::with_raw("a", JsonValue::Number(1.0));
        let right: StateSlice =
            serde_json::from_str(r#"{"agent_id":"a","raw":1}"#).expect("decode");
        assert!(left.matches(&right));
        assert!(!left.matches(&StateSlice::empty("a")));
    }

    #[test]
    fn profile_decode_defaults_collections() {
        let profile: Profile = serde_json::from_str(r#"{"id":"p"}"#).expect("decode");
        assert!(profile.intents.is_empty());
        assert!(profile.policies.is_empty());
    }
}
