//! Setup evaluation: partition plan steps, run the executable ones, and
//! summarize the run as a receipt.

use std::collections::BTreeSet;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::core::types::PlanStep;
use crate::dispatch::ServiceExecutor;

pub const RECEIPT_SCHEMA_VERSION: u32 = 1;

/// An automated step that will not run, with the reason shown to operators.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedStep {
    pub step: PlanStep,
    pub reason: String,
}

/// Disjoint partition of plan steps. Each list keeps the input order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SetupEvaluation {
    pub manual: Vec<PlanStep>,
    pub executable: Vec<PlanStep>,
    pub skipped: Vec<SkippedStep>,
}

/// Partition `steps` into manual, executable and skipped.
///
/// Allowlist membership is checked before dispatcher support.
pub fn evaluate_setup_steps(
    steps: &[PlanStep],
    allowlist: &BTreeSet<String>,
    supported: &BTreeSet<String>,
) -> SetupEvaluation {
    let mut evaluation = SetupEvaluation::default();
    for step in steps {
        if step.is_manual() {
            evaluation.manual.push(step.clone());
            continue;
        }
        let skip_reason = match step.action_ref() {
            None => Some("missing action reference".to_string()),
            Some(action) if !allowlist.contains(&action.id) => {
                Some(format!("action not allowlisted ({})", action.id))
            }
            Some(action) if !supported.contains(&action.id) => {
                Some(format!("action unsupported ({})", action.id))
            }
            Some(_) => None,
        };
        match skip_reason {
            Some(reason) => evaluation.skipped.push(SkippedStep {
                step: step.clone(),
                reason,
            }),
            None => evaluation.executable.push(step.clone()),
        }
    }
    evaluation
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pass,
    Fail,
    Error,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pass => "pass",
            StepStatus::Fail => "fail",
            StepStatus::Error => "error",
        }
    }
}

/// Record of one executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedStep {
    pub step_id: String,
    pub agent: String,
    pub action_id: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: String,
    pub finished_at: String,
}

impl ExecutedStep {
    /// `<agent>/<id>: exit=<code>` or `<agent>/<id>: <error>`; `None` on pass.
    pub fn failure_line(&self) -> Option<String> {
        match self.status {
            StepStatus::Pass => None,
            StepStatus::Fail => Some(format!(
                "{}/{}: exit={}",
                self.agent,
                self.step_id,
                self.exit_code.unwrap_or_default()
            )),
            StepStatus::Error => Some(format!(
                "{}/{}: {}",
                self.agent,
                self.step_id,
                self.error.as_deref().unwrap_or("unknown error")
            )),
        }
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Execute the evaluation's executable steps one at a time, in order.
///
/// A failing step is recorded and the batch continues.
#[instrument(skip_all, fields(steps = evaluation.executable.len()))]
pub fn run_setup(evaluation: &SetupEvaluation, executor: &ServiceExecutor) -> Vec<ExecutedStep> {
    let mut executed = Vec::with_capacity(evaluation.executable.len());
    for step in &evaluation.executable {
        let action_id = step
            .action_ref()
            .map(|action| action.id.clone())
            .unwrap_or_default();
        let started_at = now_rfc3339();
        let outcome = executor.execute(step);
        let finished_at = now_rfc3339();

        let (status, exit_code, error) = match outcome {
            Ok(code @ (None | Some(0))) => (StepStatus::Pass, code, None),
            Ok(Some(code)) => (StepStatus::Fail, Some(code), None),
            Err(err) => (StepStatus::Error, None, Some(err.to_string())),
        };
        if status != StepStatus::Pass {
            warn!(step = %step.key(), action = %action_id, ?status, "setup step failed");
        }
        executed.push(ExecutedStep {
            step_id: step.id().to_string(),
            agent: step.agent().to_string(),
            action_id,
            status,
            exit_code,
            error,
            started_at,
            finished_at,
        });
    }
    info!(executed = executed.len(), "setup steps finished");
    executed
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    DryRun,
    Pass,
    Fail,
}

impl ReceiptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReceiptStatus::DryRun => "dry_run",
            ReceiptStatus::Pass => "pass",
            ReceiptStatus::Fail => "fail",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRef {
    pub step_id: String,
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
}

impl From<&PlanStep> for StepRef {
    fn from(step: &PlanStep) -> Self {
        Self {
            step_id: step.id().to_string(),
            agent: step.agent().to_string(),
            action_id: step.action_ref().map(|action| action.id.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedStepRef {
    pub step_id: String,
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    pub reason: String,
}

/// Summary of one setup run (`setup_receipt.v1.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupReceipt {
    pub schema_version: u32,
    pub run_id: String,
    pub created_at: String,
    pub status: ReceiptStatus,
    pub apply: bool,
    pub allowlist: Vec<String>,
    pub plan_steps: Vec<StepRef>,
    pub executed_steps: Vec<ExecutedStep>,
    pub skipped_steps: Vec<SkippedStepRef>,
    pub manual_steps: Vec<StepRef>,
    pub failures: Vec<String>,
}

impl SetupReceipt {
    pub fn new(
        run_id: impl Into<String>,
        apply: bool,
        allowlist: &BTreeSet<String>,
        plan_steps: &[PlanStep],
        evaluation: &SetupEvaluation,
        executed_steps: Vec<ExecutedStep>,
    ) -> Self {
        let failures: Vec<String> = executed_steps
            .iter()
            .filter_map(ExecutedStep::failure_line)
            .collect();
        let status = if !apply {
            ReceiptStatus::DryRun
        } else if failures.is_empty() {
            ReceiptStatus::Pass
        } else {
            ReceiptStatus::Fail
        };
        Self {
            schema_version: RECEIPT_SCHEMA_VERSION,
            run_id: run_id.into(),
            created_at: now_rfc3339(),
            status,
            apply,
            allowlist: allowlist.iter().cloned().collect(),
            plan_steps: plan_steps.iter().map(StepRef::from).collect(),
            executed_steps,
            skipped_steps: evaluation
                .skipped
                .iter()
                .map(|skipped| SkippedStepRef {
                    step_id: skipped.step.id().to_string(),
                    agent: skipped.step.agent().to_string(),
                    action_id: skipped.step.action_ref().map(|action| action.id.clone()),
                    reason: skipped.reason.clone(),
                })
                .collect(),
            manual_steps: evaluation.manual.iter().map(StepRef::from).collect(),
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::{Result, anyhow};

    use super::*;
    use crate::dispatch::{ActionHandlerRegistry, ConfigBag};
    use crate::test_support::{automated_step, manual_step};

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn partition_preserves_order_within_each_set() {
        let steps = vec![
            automated_step("a", "s1", "x.one"),
            manual_step("a", "m1", "needs human"),
            automated_step("a", "s2", "x.one"),
            manual_step("b", "m2", "needs human"),
        ];
        let evaluation = evaluate_setup_steps(&steps, &set(&["x.one"]), &set(&["x.one"]));
        let executable: Vec<&str> = evaluation.executable.iter().map(PlanStep::id).collect();
        let manual: Vec<&str> = evaluation.manual.iter().map(PlanStep::id).collect();
        assert_eq!(executable, vec!["s1", "s2"]);
        assert_eq!(manual, vec!["m1", "m2"]);
        assert!(evaluation.skipped.is_empty());
    }

    #[test]
    fn allowlist_is_checked_before_support() {
        let steps = vec![automated_step("a", "s", "x.unknown")];
        let evaluation = evaluate_setup_steps(&steps, &set(&[]), &set(&[]));
        assert_eq!(evaluation.skipped[0].reason, "action not allowlisted (x.unknown)");
    }

    #[test]
    fn allowlisted_but_unsupported_is_skipped() {
        let steps = vec![automated_step("a", "s", "x.one")];
        let evaluation = evaluate_setup_steps(&steps, &set(&["x.one"]), &set(&[]));
        assert_eq!(evaluation.skipped[0].reason, "action unsupported (x.one)");
    }

    #[test]
    fn automated_step_without_action_is_skipped() {
        let steps = vec![PlanStep::automated("a", "s", "d")];
        let evaluation = evaluate_setup_steps(&steps, &set(&["x.one"]), &set(&["x.one"]));
        assert_eq!(evaluation.skipped[0].reason, "missing action reference");
    }

    #[test]
    fn run_setup_records_failures_and_continues() {
        let registry = ActionHandlerRegistry::new()
            .with("x.ok", |_: &ConfigBag, _: &PlanStep| -> Result<Option<i32>> { Ok(None) })
            .with("x.exit", |_: &ConfigBag, _: &PlanStep| -> Result<Option<i32>> { Ok(Some(3)) })
            .with("x.err", |_: &ConfigBag, _: &PlanStep| -> Result<Option<i32>> {
                Err(anyhow!("boom"))
            });
        let executor = ServiceExecutor::new(registry);
        let steps = vec![
            automated_step("a", "exit", "x.exit"),
            automated_step("a", "err", "x.err"),
            automated_step("a", "ok", "x.ok"),
        ];
        let supported = executor.supported_actions();
        let evaluation = evaluate_setup_steps(&steps, &supported, &supported);
        let executed = run_setup(&evaluation, &executor);

        let statuses: Vec<StepStatus> = executed.iter().map(|step| step.status).collect();
        assert_eq!(
            statuses,
            vec![StepStatus::Fail, StepStatus::Error, StepStatus::Pass]
        );

        let receipt = SetupReceipt::new("run", true, &supported, &steps, &evaluation, executed);
        assert_eq!(receipt.status, ReceiptStatus::Fail);
        assert_eq!(
            receipt.failures,
            vec!["a/exit: exit=3".to_string(), "a/err: boom".to_string()]
        );
    }

    #[test]
    fn failure_line_keeps_the_handler_error_chain() {
        let registry = ActionHandlerRegistry::new().with(
            "x.chain",
            |_: &ConfigBag, _: &PlanStep| -> Result<Option<i32>> {
                Err(anyhow!("No such file or directory").context("run tool"))
            },
        );
        let executor = ServiceExecutor::new(registry);
        let steps = vec![automated_step("a", "s", "x.chain")];
        let supported = executor.supported_actions();
        let evaluation = evaluate_setup_steps(&steps, &supported, &supported);
        let executed = run_setup(&evaluation, &executor);

        assert_eq!(
            executed[0].failure_line().as_deref(),
            Some("a/s: run tool: No such file or directory")
        );
    }

    #[test]
    fn dry_run_receipt_lists_skipped_and_manual() {
        let steps = vec![
            manual_step("a", "m", "needs human"),
            automated_step("a", "s", "x.blocked"),
        ];
        let allowlist = set(&["x.one"]);
        let evaluation = evaluate_setup_steps(&steps, &allowlist, &allowlist);
        let receipt = SetupReceipt::new("run", false, &allowlist, &steps, &evaluation, Vec::new());
        assert_eq!(receipt.status, ReceiptStatus::DryRun);
        assert_eq!(receipt.schema_version, RECEIPT_SCHEMA_VERSION);
        assert_eq!(receipt.plan_steps.len(), 2);
        assert_eq!(receipt.manual_steps[0].step_id, "m");
        assert_eq!(receipt.skipped_steps[0].action_id.as_deref(), Some("x.blocked"));
        assert!(receipt.failures.is_empty());
    }
}
