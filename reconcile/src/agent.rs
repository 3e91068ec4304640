//! Agent capability interface.
//!
//! The [`Agent`] trait decouples the runtime from concrete state sources.
//! Tests use static agents that return canned slices and checks.

use anyhow::Result;

use crate::core::registry::{CheckRegistry, PlanRegistry};
use crate::core::state::ObservedStateSlice;

/// A pluggable component that reports one observed slice and may register
/// lazily evaluated checks and plan steps.
pub trait Agent {
    /// Unique id among the runtime's agents.
    fn id(&self) -> &str;

    /// Register health checks. Closures run once per sweep.
    fn register_checks<'a>(&'a self, _registry: &mut CheckRegistry<'a>) {}

    /// Register plan steps. Still drained by `Runtime::plan` after the diff.
    fn register_plans<'a>(&'a self, _registry: &mut PlanRegistry<'a>) {}

    /// Report this agent's current state.
    fn observe_state(&self) -> Result<ObservedStateSlice>;
}
