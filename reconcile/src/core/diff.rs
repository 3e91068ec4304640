//! Desired-vs-observed reconciliation.
//!
//! Both functions walk desired slices sorted by agent id and look up the
//! observed slice with the same id. A missing slice and a structural
//! difference each yield one manual plan step and one `warn`/`policy` check.

use std::collections::BTreeMap;

use crate::core::invariants::sort_steps;
use crate::core::state::{DesiredState, DesiredStateSlice, ObservedState, ObservedStateSlice};
use crate::core::types::{
    ActionKind, ActionRef, CheckCategory, CheckResult, PlanStep, PlanStepError, Severity,
};

pub const REASON_OBSERVED_STATE_MISSING: &str = "observed_state_missing";
pub const REASON_STATE_DIFF: &str = "state_diff";

const KIND_MISSING: &str = "observed_state_missing";
const KIND_MISMATCH: &str = "observed_state_mismatch";

enum Divergence<'a> {
    Missing(&'a DesiredStateSlice),
    Mismatch(&'a ObservedStateSlice, &'a DesiredStateSlice),
}

fn divergences<'a>(observed: &'a ObservedState, desired: &'a DesiredState) -> Vec<Divergence<'a>> {
    let observed_by_agent: BTreeMap<&str, &ObservedStateSlice> = observed
        .slices
        .iter()
        .map(|slice| (slice.agent_id.as_str(), slice))
        .collect();
    let mut desired_sorted: Vec<&DesiredStateSlice> = desired.slices.iter().collect();
    desired_sorted.sort_by(|left, right| left.agent_id.cmp(&right.agent_id));

    desired_sorted
        .into_iter()
        .filter_map(|want| match observed_by_agent.get(want.agent_id.as_str()) {
            None => Some(Divergence::Missing(want)),
            Some(have) if !have.matches(want) => Some(Divergence::Mismatch(*have, want)),
            Some(_) => None,
        })
        .collect()
}

/// Remediation steps for every diverging desired slice, sorted by `(agent, id)`.
pub fn diff(observed: &ObservedState, desired: &DesiredState) -> Result<Vec<PlanStep>, PlanStepError> {
    let mut steps = Vec::new();
    for divergence in divergences(observed, desired) {
        let step = match divergence {
            Divergence::Missing(want) => PlanStep::manual(
                &want.agent_id,
                format!("state_missing_{}", want.agent_id),
                format!("Provide observed state slice for agent {}", want.agent_id),
                REASON_OBSERVED_STATE_MISSING,
            )?,
            Divergence::Mismatch(_, want) => PlanStep::manual(
                &want.agent_id,
                format!("state_mismatch_{}", want.agent_id),
                format!(
                    "Reconcile observed state with desired state for agent {}",
                    want.agent_id
                ),
                REASON_STATE_DIFF,
            )?,
        };
        steps.push(step);
    }
    sort_steps(&mut steps);
    Ok(steps)
}

/// Health checks describing every diverging desired slice.
pub fn mismatch_checks(observed: &ObservedState, desired: &DesiredState) -> Vec<CheckResult> {
    divergences(observed, desired)
        .into_iter()
        .map(|divergence| match divergence {
            Divergence::Missing(want) => {
                let mut check = CheckResult::new(
                    &want.agent_id,
                    format!("state_missing_{}", want.agent_id),
                    Severity::Warn,
                    CheckCategory::Policy,
                );
                check.expected = want.payload();
                check.suggested_actions = suggested_actions(&want.agent_id, KIND_MISSING);
                check
            }
            Divergence::Mismatch(have, want) => {
                let mut check = CheckResult::new(
                    &want.agent_id,
                    format!("state_mismatch_{}", want.agent_id),
                    Severity::Warn,
                    CheckCategory::Policy,
                );
                check.observed = have.payload();
                check.expected = want.payload();
                check.suggested_actions = suggested_actions(&want.agent_id, KIND_MISMATCH);
                check
            }
        })
        .collect()
}

/// Always `[docs, open]`, in that order.
fn suggested_actions(agent_id: &str, kind: &str) -> Vec<ActionRef> {
    vec![
        ActionRef::new(format!("docs.{agent_id}.{kind}"), ActionKind::Docs)
            .with_description(format!("Review runbook for {agent_id} ({kind})")),
        ActionRef::new(format!("open.{agent_id}.state"), ActionKind::Open)
            .with_description(format!("Open state details for {agent_id}")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::json::JsonValue;
    use crate::core::state::StateSlice;

    fn observed(slices: Vec<StateSlice>) -> ObservedState {
        ObservedState { slices }
    }

    fn desired(slices: Vec<StateSlice>) -> DesiredState {
        DesiredState { slices }
    }

    #[test]
    fn matching_slices_produce_nothing() {
        let have = observed(vec![StateSlice::with_raw("a", JsonValue::from("x"))]);
        let want = desired(vec![StateSlice::with_raw("a", JsonValue::from("x"))]);
        assert!(diff(&have, &want).expect("diff").is_empty());
        assert!(mismatch_checks(&have, &want).is_empty());
    }

    #[test]
    fn missing_slice_yields_manual_step() {
        let steps = diff(
            &observed(Vec::new()),
            &desired(vec![StateSlice::with_raw("a", JsonValue::Null)]),
        )
        .expect("diff");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].id(), "state_missing_a");
        assert_eq!(steps[0].manual_reason(), Some(REASON_OBSERVED_STATE_MISSING));
    }

    #[test]
    fn mismatch_check_carries_docs_then_open() {
        let have = observed(vec![StateSlice::with_raw("a", JsonValue::from("old"))]);
        let want = desired(vec![StateSlice::with_raw("a", JsonValue::from("new"))]);
        let checks = mismatch_checks(&have, &want);
        assert_eq!(checks.len(), 1);
        let check = &checks[0];
        assert_eq!(check.id, "state_mismatch_a");
        assert_eq!(check.observed, Some(JsonValue::from("old")));
        assert_eq!(check.expected, Some(JsonValue::from("new")));
        let kinds: Vec<ActionKind> = check.suggested_actions.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![ActionKind::Docs, ActionKind::Open]);
        assert_eq!(check.suggested_actions[0].id, "docs.a.observed_state_mismatch");
        assert_eq!(check.suggested_actions[1].id, "open.a.state");
    }

    #[test]
    fn steps_sorted_by_agent_then_id() {
        let want = desired(vec![
            StateSlice::with_raw("zeta", JsonValue::Null),
            StateSlice::with_raw("alpha", JsonValue::Null),
        ]);
        let steps = diff(&observed(Vec::new()), &want).expect("diff");
        let agents: Vec<&str> = steps.iter().map(PlanStep::agent).collect();
        assert_eq!(agents, vec!["alpha", "zeta"]);
    }
}
