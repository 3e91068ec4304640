//! Reconciliation runtime: sweep (health) and plan (remediation).
//!
//! Both operations are pure over one snapshot: agents are observed once each,
//! in registration order, and any invariant violation aborts the call without
//! a partial report.

use std::collections::HashSet;
use std::error::Error as StdError;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::agent::Agent;
use crate::core::diff::{diff, mismatch_checks};
use crate::core::invariants::{duplicate_check_key, sort_checks, sort_steps};
use crate::core::registry::{CheckRegistry, PlanRegistry};
use crate::core::state::{DesiredState, ObservedState, Profile, profile_slice};
use crate::core::types::{CheckResult, PlanStep, PlanStepError};

type BoxError = Box<dyn StdError + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("duplicate agent id '{0}'")]
    DuplicateAgentId(String),
    #[error("duplicate check key '{0}'")]
    DuplicateCheckKey(String),
    #[error("agent '{agent}' failed to observe state: {source}")]
    Observe {
        agent: String,
        #[source]
        source: BoxError,
    },
    #[error("check '{key}' failed: {source}")]
    Check {
        key: String,
        #[source]
        source: BoxError,
    },
    #[error("plan '{key}' failed: {source}")]
    Plan {
        key: String,
        #[source]
        source: BoxError,
    },
    #[error(transparent)]
    InvalidStep(#[from] PlanStepError),
}

/// Health report. `checks` are ordered by severity rank, then `(agent, id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub observed_state: ObservedState,
    pub desired_state: DesiredState,
    pub checks: Vec<CheckResult>,
}

/// Remediation report. `steps` are ordered by `(agent, id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanReport {
    pub observed_state: ObservedState,
    pub desired_state: DesiredState,
    pub steps: Vec<PlanStep>,
}

/// Owns the agents and the optional desired profile.
#[derive(Default)]
pub struct Runtime {
    agents: Vec<Box<dyn Agent>>,
    profile: Option<Profile>,
}

impl Runtime {
    pub fn new(agents: Vec<Box<dyn Agent>>, profile: Option<Profile>) -> Self {
        Self { agents, profile }
    }

    pub fn with_agent(mut self, agent: impl Agent + 'static) -> Self {
        self.agents.push(Box::new(agent));
        self
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn agent_ids(&self) -> Vec<&str> {
        self.agents.iter().map(|agent| agent.id()).collect()
    }

    #[instrument(skip_all, fields(agents = self.agents.len()))]
    pub fn sweep(&self) -> Result<SweepReport, RuntimeError> {
        let observed_state = self.observe_state()?;
        let desired_state = self.desired_state();
        let checks = self.evaluate_checks(&observed_state, &desired_state)?;
        info!(
            checks = checks.len(),
            desired = desired_state.slices.len(),
            "sweep complete"
        );
        Ok(SweepReport {
            observed_state,
            desired_state,
            checks,
        })
    }

    #[instrument(skip_all, fields(agents = self.agents.len()))]
    pub fn plan(&self) -> Result<PlanReport, RuntimeError> {
        let sweep = self.sweep()?;
        let mut steps = diff(&sweep.observed_state, &sweep.desired_state)?;

        let mut registry = PlanRegistry::new();
        for agent in &self.agents {
            agent.register_plans(&mut registry);
        }
        for entry in registry.into_entries() {
            let key = entry.id.clone();
            let produced = entry.run().map_err(|err| RuntimeError::Plan {
                key: key.clone(),
                source: err.into(),
            })?;
            debug!(plan = %key, steps = produced.len(), "plan registration evaluated");
            steps.extend(produced);
        }
        sort_steps(&mut steps);
        info!(steps = steps.len(), "plan complete");

        Ok(PlanReport {
            observed_state: sweep.observed_state,
            desired_state: sweep.desired_state,
            steps,
        })
    }

    /// Stops at the first slice whose agent id was already observed; later
    /// agents are not invoked.
    fn observe_state(&self) -> Result<ObservedState, RuntimeError> {
        let mut slices = Vec::with_capacity(self.agents.len());
        let mut seen = HashSet::new();
        for agent in &self.agents {
            let slice = agent.observe_state().map_err(|err| RuntimeError::Observe {
                agent: agent.id().to_string(),
                source: err.into(),
            })?;
            if !seen.insert(slice.agent_id.clone()) {
                return Err(RuntimeError::DuplicateAgentId(slice.agent_id));
            }
            debug!(agent = agent.id(), "observed state");
            slices.push(slice);
        }
        Ok(ObservedState { slices })
    }

    fn desired_state(&self) -> DesiredState {
        DesiredState {
            slices: self.profile.iter().map(profile_slice).collect(),
        }
    }

    fn evaluate_checks(
        &self,
        observed: &ObservedState,
        desired: &DesiredState,
    ) -> Result<Vec<CheckResult>, RuntimeError> {
        let mut registry = CheckRegistry::new();
        for agent in &self.agents {
            agent.register_checks(&mut registry);
        }
        let mut results = Vec::with_capacity(registry.len());
        for entry in registry.into_entries() {
            let key = entry.id.clone();
            let result = entry.run().map_err(|err| RuntimeError::Check {
                key: key.clone(),
                source: err.into(),
            })?;
            debug!(check = %key, severity = result.severity.as_str(), "check evaluated");
            results.push(result);
        }
        results.extend(mismatch_checks(observed, desired));

        if let Some(key) = duplicate_check_key(&results) {
            return Err(RuntimeError::DuplicateCheckKey(key));
        }
        sort_checks(&mut results);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::json::JsonValue;
    use crate::core::state::StateSlice;
    use crate::core::types::{CheckCategory, Severity};
    use crate::test_support::StaticAgent;

    #[test]
    fn duplicate_agent_id_wins_over_later_observe_failure() {
        let runtime = Runtime::default()
            .with_agent(StaticAgent::new("a"))
            .with_agent(StaticAgent::new("a"))
            .with_agent(StaticAgent::failing("broken"));
        let err = runtime.sweep().expect_err("duplicate agent");
        assert!(matches!(err, RuntimeError::DuplicateAgentId(ref id) if id == "a"));
    }

    #[test]
    fn sweep_errors_on_failing_observe() {
        let runtime = Runtime::default().with_agent(StaticAgent::failing("broken"));
        let err = runtime.sweep().expect_err("observe failure");
        assert!(matches!(err, RuntimeError::Observe { ref agent, .. } if agent == "broken"));
    }

    #[test]
    fn sweep_errors_on_failing_check() {
        let agent = StaticAgent::new("a").with_failing_check("boom");
        let runtime = Runtime::default().with_agent(agent);
        let err = runtime.sweep().expect_err("check failure");
        assert!(err.to_string().contains("boom"), "{err}");
    }

    #[test]
    fn sweep_includes_mismatch_checks_for_profile() {
        let agent = StaticAgent::new("profile")
            .with_slice(StateSlice::with_raw("profile", JsonValue::from("other")));
        let runtime = Runtime::default()
            .with_agent(agent)
            .with_profile(Profile::new("p"));
        let report = runtime.sweep().expect("sweep");
        assert_eq!(report.checks.len(), 1);
        assert_eq!(report.checks[0].id, "state_mismatch_profile");
        assert_eq!(report.checks[0].severity, Severity::Warn);
        assert_eq!(report.checks[0].category, CheckCategory::Policy);
    }

    #[test]
    fn plan_appends_registered_steps_sorted() {
        let agent = StaticAgent::new("b")
            .with_step(PlanStep::automated("b", "z_step", "later"))
            .with_step(PlanStep::automated("a", "a_step", "first"));
        let runtime = Runtime::default().with_agent(agent);
        let report = runtime.plan().expect("plan");
        let keys: Vec<String> = report.steps.iter().map(PlanStep::key).collect();
        assert_eq!(keys, vec!["a/a_step", "b/z_step"]);
    }

    #[test]
    fn no_profile_means_no_desired_state() {
        let runtime = Runtime::default().with_agent(StaticAgent::new("a"));
        let report = runtime.plan().expect("plan");
        assert!(report.desired_state.slices.is_empty());
        assert!(report.steps.is_empty());
    }
}
