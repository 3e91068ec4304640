//! Plain-text rendering of reports for terminal output.
//!
//! Each renderer collects lines and joins them, so the output always ends
//! with a newline.

use crate::catalog::CATALOG;
use crate::core::types::{CheckResult, PlanStep, Severity};
use crate::runtime::{PlanReport, SweepReport};
use crate::workspace::SetupOutcome;

pub fn render_sweep(report: &SweepReport) -> String {
    let count = |severity: Severity| {
        report
            .checks
            .iter()
            .filter(|check| check.severity == severity)
            .count()
    };
    let mut lines = vec![format!(
        "checks: {} (fail {}, warn {}, pass {})",
        report.checks.len(),
        count(Severity::Fail),
        count(Severity::Warn),
        count(Severity::Pass)
    )];
    for check in &report.checks {
        lines.extend(check_lines(check));
    }
    finish(lines)
}

fn check_lines(check: &CheckResult) -> Vec<String> {
    let mut lines = vec![format!(
        "[{}] {} ({})",
        check.severity.as_str(),
        check.key(),
        check.category.as_str()
    )];
    if let Some(observed) = &check.observed {
        lines.push(format!("  observed: {}", observed.to_json_string()));
    }
    if let Some(expected) = &check.expected {
        lines.push(format!("  expected: {}", expected.to_json_string()));
    }
    for evidence in &check.evidence {
        lines.push(match &evidence.path {
            Some(path) => format!("  evidence {} ({}): {path}", evidence.id, evidence.kind),
            None => format!("  evidence {} ({})", evidence.id, evidence.kind),
        });
    }
    for action in &check.suggested_actions {
        let description = action
            .description
            .as_deref()
            .map(|text| format!(": {text}"))
            .unwrap_or_default();
        lines.push(format!(
            "  -> {} {}{description}",
            action.kind.as_str(),
            action.id
        ));
    }
    lines
}

pub fn render_plan(report: &PlanReport) -> String {
    let mut lines = vec![format!("steps: {}", report.steps.len())];
    for (index, step) in report.steps.iter().enumerate() {
        lines.push(format!("{}. {} [{}]", index + 1, step.key(), step_mode(step)));
        lines.push(format!("   {}", step.description()));
    }
    finish(lines)
}

fn step_mode(step: &PlanStep) -> String {
    match (step.manual_reason(), step.action_ref()) {
        (Some(reason), _) if step.is_manual() => format!("manual: {reason}"),
        (_, Some(action)) => format!("automated: {}", action.id),
        _ => "automated".to_string(),
    }
}

pub fn render_setup(outcome: &SetupOutcome, show_manual: bool) -> String {
    let receipt = &outcome.receipt;
    let evaluation = &outcome.evaluation;
    let mut lines = vec![format!(
        "run {} ({}): {} executable, {} skipped, {} manual",
        receipt.run_id,
        receipt.status.as_str(),
        evaluation.executable.len(),
        evaluation.skipped.len(),
        evaluation.manual.len()
    )];
    for executed in &receipt.executed_steps {
        lines.push(format!(
            "  ran {}/{} {} -> {}",
            executed.agent,
            executed.step_id,
            executed.action_id,
            executed.status.as_str()
        ));
    }
    if !receipt.apply {
        for step in &evaluation.executable {
            lines.push(format!("  would run {} ({})", step.key(), step_mode(step)));
        }
    }
    for skipped in &evaluation.skipped {
        lines.push(format!("  skipped {}: {}", skipped.step.key(), skipped.reason));
    }
    if show_manual {
        for step in &evaluation.manual {
            lines.push(format!(
                "  manual {}: {}",
                step.key(),
                step.manual_reason().unwrap_or_default()
            ));
        }
    }
    for failure in &receipt.failures {
        lines.push(format!("  failed {failure}"));
    }
    lines.push(format!("receipt: {}", outcome.receipt_path.display()));
    finish(lines)
}

pub fn render_catalog() -> String {
    let mut lines = Vec::with_capacity(CATALOG.len() * 2);
    for spec in CATALOG {
        let mode = if spec.enabled_in_setup {
            "allowlisted"
        } else {
            "manual-only"
        };
        lines.push(format!(
            "{:<16} {:<8} {:<12} {}",
            spec.id,
            spec.kind.as_str(),
            mode,
            spec.description
        ));
        lines.push(format!("{:<16} config: {}", "", spec.config_keys.join(", ")));
    }
    finish(lines)
}

fn finish(lines: Vec<String>) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}
