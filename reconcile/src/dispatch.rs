//! Action handler registry and the step dispatcher.
//!
//! [`ServiceExecutor`] resolves a plan step's action reference to a registered
//! [`ActionHandler`], hands it the step's config as a [`ConfigBag`] and
//! forwards the handler's exit code or error. It never retries.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use tracing::{debug, instrument, warn};

use crate::core::json::{JsonObject, JsonValue};
use crate::core::types::PlanStep;

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("missing config")]
    MissingConfig,
    #[error("unsupported action: {0}")]
    UnsupportedAction(String),
    /// `message` is the handler's full error chain, outermost context first.
    #[error("{message}")]
    Handler { action: String, message: String },
}

/// Failure-tolerant typed view over a step's config object.
///
/// Every getter returns `None` when the key is missing or has another type;
/// callers pick their own defaults.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigBag {
    values: JsonObject,
}

impl ConfigBag {
    pub fn new(values: JsonObject) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.values.get(key)
    }

    pub fn string(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(JsonValue::as_str)
    }

    /// Like [`ConfigBag::string`], but blank strings count as absent.
    pub fn string_non_empty(&self, key: &str) -> Option<&str> {
        self.string(key).filter(|value| !value.trim().is_empty())
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(JsonValue::as_bool)
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(JsonValue::as_i64)
    }

    pub fn double(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(JsonValue::as_f64)
    }

    /// `None` unless the value is an array made only of strings.
    pub fn string_array(&self, key: &str) -> Option<Vec<String>> {
        self.get(key)?
            .as_array()?
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect()
    }
}

/// Executes one action. Returns an exit code (`0` = success) or `None` when
/// the action has no meaningful code.
pub trait ActionHandler {
    fn run(&self, config: &ConfigBag, step: &PlanStep) -> Result<Option<i32>>;
}

impl<F> ActionHandler for F
where
    F: Fn(&ConfigBag, &PlanStep) -> Result<Option<i32>>,
{
    fn run(&self, config: &ConfigBag, step: &PlanStep) -> Result<Option<i32>> {
        self(config, step)
    }
}

/// Action id -> handler map.
#[derive(Default)]
pub struct ActionHandlerRegistry {
    handlers: BTreeMap<String, Box<dyn ActionHandler>>,
}

impl ActionHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous handler for the same id.
    pub fn register(&mut self, action_id: impl Into<String>, handler: impl ActionHandler + 'static) {
        self.handlers.insert(action_id.into(), Box::new(handler));
    }

    pub fn with(mut self, action_id: impl Into<String>, handler: impl ActionHandler + 'static) -> Self {
        self.register(action_id, handler);
        self
    }

    pub fn get(&self, action_id: &str) -> Option<&dyn ActionHandler> {
        self.handlers.get(action_id).map(|handler| handler.as_ref())
    }

    pub fn supported_actions(&self) -> BTreeSet<String> {
        self.handlers.keys().cloned().collect()
    }
}

/// Dispatcher over an [`ActionHandlerRegistry`].
pub struct ServiceExecutor {
    registry: ActionHandlerRegistry,
}

impl ServiceExecutor {
    pub fn new(registry: ActionHandlerRegistry) -> Self {
        Self { registry }
    }

    pub fn supported_actions(&self) -> BTreeSet<String> {
        self.registry.supported_actions()
    }

    /// Run the handler for `step.action_ref`.
    ///
    /// Steps without an action reference are not executable and yield `Ok(None)`.
    #[instrument(skip_all, fields(step = %step.key()))]
    pub fn execute(&self, step: &PlanStep) -> Result<Option<i32>, ExecutionError> {
        let Some(action) = step.action_ref() else {
            debug!("step has no action reference");
            return Ok(None);
        };
        let config = config_bag(step).ok_or(ExecutionError::MissingConfig)?;
        let handler = self
            .registry
            .get(&action.id)
            .ok_or_else(|| ExecutionError::UnsupportedAction(action.id.clone()))?;

        debug!(action = %action.id, "invoking handler");
        match handler.run(&config, step) {
            Ok(code) => {
                debug!(action = %action.id, exit_code = ?code, "handler finished");
                Ok(code)
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(action = %action.id, error = %message, "handler failed");
                Err(ExecutionError::Handler {
                    action: action.id.clone(),
                    message,
                })
            }
        }
    }
}

/// Parse the step's `config` effect; `None` when absent or not a JSON object.
fn config_bag(step: &PlanStep) -> Option<ConfigBag> {
    let effect = step.config_effect()?;
    match serde_json::from_str::<JsonValue>(&effect.target).ok()? {
        JsonValue::Object(values) => Some(ConfigBag::new(values)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use anyhow::anyhow;

    use super::*;
    use crate::core::types::{ActionKind, ActionRef, Effect, EffectKind};

    fn bag(json: &str) -> ConfigBag {
        match serde_json::from_str::<JsonValue>(json).expect("json") {
            JsonValue::Object(values) => ConfigBag::new(values),
            other => panic!("not an object: {other:?}"),
        }
    }

    fn step_with_config(action: &str, target: &str) -> PlanStep {
        PlanStep::automated("a", "s", "d")
            .with_action(ActionRef::new(action, ActionKind::Setup))
            .with_effect(Effect::new("cfg", EffectKind::Config, target))
            .expect("effect")
    }

    #[test]
    fn config_bag_getters_tolerate_missing_and_mistyped() {
        let config = bag(r#"{"name":"x","blank":"  ","on":true,"n":3,"f":1.5,"list":["a","b"],"mixed":["a",1]}"#);
        assert_eq!(config.string("name"), Some("x"));
        assert_eq!(config.string("on"), None);
        assert_eq!(config.string_non_empty("blank"), None);
        assert_eq!(config.bool("on"), Some(true));
        assert_eq!(config.bool("missing"), None);
        assert_eq!(config.int("n"), Some(3));
        assert_eq!(config.int("f"), None);
        assert_eq!(config.double("n"), Some(3.0));
        assert_eq!(
            config.string_array("list"),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(config.string_array("mixed"), None);
        assert_eq!(config.string_array("name"), None);
    }

    #[test]
    fn execute_without_action_ref_is_not_executable() {
        let executor = ServiceExecutor::new(ActionHandlerRegistry::new());
        let step = PlanStep::automated("a", "s", "d");
        assert_eq!(executor.execute(&step).expect("execute"), None);
    }

    #[test]
    fn execute_errors_on_missing_config() {
        let executor = ServiceExecutor::new(ActionHandlerRegistry::new());
        let step = PlanStep::automated("a", "s", "d")
            .with_action(ActionRef::new("x.run", ActionKind::Setup));
        assert!(matches!(
            executor.execute(&step),
            Err(ExecutionError::MissingConfig)
        ));
    }

    #[test]
    fn execute_errors_on_non_object_config() {
        let executor = ServiceExecutor::new(ActionHandlerRegistry::new());
        let step = step_with_config("x.run", "[1,2]");
        assert!(matches!(
            executor.execute(&step),
            Err(ExecutionError::MissingConfig)
        ));
    }

    #[test]
    fn execute_errors_on_unsupported_action() {
        let executor = ServiceExecutor::new(ActionHandlerRegistry::new());
        let step = step_with_config("x.run", "{}");
        let err = executor.execute(&step).expect_err("unsupported");
        assert_eq!(err.to_string(), "unsupported action: x.run");
    }

    #[test]
    fn execute_passes_config_and_forwards_exit_code() {
        let seen = Rc::new(RefCell::new(None));
        let captured = Rc::clone(&seen);
        let registry = ActionHandlerRegistry::new().with(
            "x.run",
            move |config: &ConfigBag, _step: &PlanStep| -> Result<Option<i32>> {
                *captured.borrow_mut() = config.string("target").map(str::to_string);
                Ok(Some(7))
            },
        );
        let executor = ServiceExecutor::new(registry);
        let code = executor
            .execute(&step_with_config("x.run", r#"{"target":"t"}"#))
            .expect("execute");
        assert_eq!(code, Some(7));
        assert_eq!(seen.borrow().as_deref(), Some("t"));
    }

    #[test]
    fn execute_forwards_handler_error() {
        let registry = ActionHandlerRegistry::new().with(
            "x.run",
            |_config: &ConfigBag, _step: &PlanStep| -> Result<Option<i32>> { Err(anyhow!("disk full")) },
        );
        let executor = ServiceExecutor::new(registry);
        let err = executor
            .execute(&step_with_config("x.run", "{}"))
            .expect_err("handler error");
        assert_eq!(err.to_string(), "disk full");
    }
}
