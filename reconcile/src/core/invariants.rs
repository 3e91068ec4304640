//! Structural invariants over checks and plan steps.

use std::collections::HashSet;

use crate::core::types::{CheckResult, PlanStep};

/// First `<agent>/<id>` key that appears twice, if any.
pub fn duplicate_check_key(checks: &[CheckResult]) -> Option<String> {
    let mut seen = HashSet::new();
    checks
        .iter()
        .map(CheckResult::key)
        .find(|key| !seen.insert(key.clone()))
}

/// Sort checks by severity rank, then `(agent, id)`.
pub fn sort_checks(checks: &mut [CheckResult]) {
    checks.sort_by(|left, right| check_sort_key(left).cmp(&check_sort_key(right)));
}

/// Sort plan steps by `(agent, id)`.
pub fn sort_steps(steps: &mut [PlanStep]) {
    steps.sort_by(|left, right| (left.agent(), left.id()).cmp(&(right.agent(), right.id())));
}

fn check_sort_key(check: &CheckResult) -> (u8, &str, &str) {
    (check.severity.rank(), check.agent.as_str(), check.id.as_str())
}

/// Check report-level invariants:
/// - No duplicate `(agent, id)` check keys
/// - Checks sorted by `(severity rank, agent, id)`
/// - Steps sorted by `(agent, id)`
pub fn validate_report(checks: &[CheckResult], steps: &[PlanStep]) -> Vec<String> {
    let mut errors = Vec::new();
    if let Some(key) = duplicate_check_key(checks) {
        errors.push(format!("duplicate check key '{key}'"));
    }
    let checks_sorted = checks
        .windows(2)
        .all(|pair| check_sort_key(&pair[0]) <= check_sort_key(&pair[1]));
    if !checks_sorted {
        errors.push("checks must be sorted by (severity,agent,id)".to_string());
    }
    let steps_sorted = steps
        .windows(2)
        .all(|pair| (pair[0].agent(), pair[0].id()) <= (pair[1].agent(), pair[1].id()));
    if !steps_sorted {
        errors.push("steps must be sorted by (agent,id)".to_string());
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{CheckCategory, Severity};

    fn check(agent: &str, id: &str, severity: Severity) -> CheckResult {
        CheckResult::new(agent, id, severity, CheckCategory::Runtime)
    }

    #[test]
    fn same_id_under_different_agents_is_not_a_duplicate() {
        let checks = vec![check("a", "x", Severity::Pass), check("b", "x", Severity::Pass)];
        assert_eq!(duplicate_check_key(&checks), None);
    }

    #[test]
    fn sort_checks_orders_severity_first() {
        let mut checks = vec![
            check("a", "z", Severity::Pass),
            check("b", "y", Severity::Warn),
            check("a", "x", Severity::Fail),
        ];
        sort_checks(&mut checks);
        let keys: Vec<String> = checks.iter().map(CheckResult::key).collect();
        assert_eq!(keys, vec!["a/x", "b/y", "a/z"]);
        assert!(validate_report(&checks, &[]).is_empty());
    }

    #[test]
    fn validate_report_flags_unsorted_steps() {
        let steps = vec![
            PlanStep::automated("b", "s", "d"),
            PlanStep::automated("a", "s", "d"),
        ];
        let errors = validate_report(&[], &steps);
        assert_eq!(errors, vec!["steps must be sorted by (agent,id)".to_string()]);
    }
}
