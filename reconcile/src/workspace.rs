//! Workspace orchestration for `reconcile sweep`, `plan` and `setup`.
//!
//! Loads `.reconcile/` config and profile, builds the runtime and dispatcher,
//! and writes setup receipts. Pure reconciliation lives in [`crate::runtime`]
//! and [`crate::setup`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing::{info, instrument};

use crate::agents::build_agents;
use crate::catalog::setup_allowlist;
use crate::core::state::Profile;
use crate::dispatch::ServiceExecutor;
use crate::io::config::{ReconcileConfig, load_config};
use crate::io::handlers::{HandlerContext, default_registry};
use crate::io::init::ReconcilePaths;
use crate::io::profile_store::load_profile;
use crate::io::receipt::{new_run_id, write_receipt};
use crate::runtime::{PlanReport, Runtime, SweepReport};
use crate::setup::{SetupEvaluation, SetupReceipt, evaluate_setup_steps, run_setup};

/// Loaded workspace: paths, validated config and the optional profile.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub paths: ReconcilePaths,
    pub config: ReconcileConfig,
    pub profile: Option<Profile>,
}

impl Workspace {
    /// Load `.reconcile/` under `root`. Fails when the workspace was never initialized.
    pub fn load(root: &Path) -> Result<Self> {
        let paths = ReconcilePaths::new(root);
        if !paths.reconcile_dir.is_dir() {
            return Err(anyhow!(
                "missing {} (run `reconcile init`)",
                paths.reconcile_dir.display()
            ));
        }
        let config = load_config(&paths.config_path)?;
        let profile = load_profile(&paths.profile_path(&config))?;
        Ok(Self {
            paths,
            config,
            profile,
        })
    }

    pub fn runtime(&self) -> Result<Runtime> {
        let agents = build_agents(&self.config, &self.paths)?;
        Ok(Runtime::new(agents, self.profile.clone()))
    }

    pub fn handler_context(&self) -> HandlerContext {
        HandlerContext {
            root: self.paths.root.clone(),
            state_dir: self.paths.state_dir(&self.config),
            command_timeout: Duration::from_secs(self.config.command_timeout_secs),
            output_limit_bytes: self.config.command_output_limit_bytes,
        }
    }

    pub fn executor(&self) -> ServiceExecutor {
        ServiceExecutor::new(default_registry(&self.handler_context()))
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.paths.runs_dir(&self.config)
    }
}

pub fn sweep(root: &Path) -> Result<SweepReport> {
    let workspace = Workspace::load(root)?;
    let report = workspace.runtime()?.sweep().context("sweep")?;
    Ok(report)
}

pub fn plan(root: &Path) -> Result<PlanReport> {
    let workspace = Workspace::load(root)?;
    let report = workspace.runtime()?.plan().context("plan")?;
    Ok(report)
}

/// Options for `setup`.
#[derive(Debug, Clone, Copy)]
pub struct SetupOptions {
    /// Execute allowlisted steps; otherwise only evaluate and record.
    pub apply: bool,
}

/// Result of a setup run.
#[derive(Debug, Clone)]
pub struct SetupOutcome {
    pub evaluation: SetupEvaluation,
    pub receipt: SetupReceipt,
    pub receipt_path: PathBuf,
}

/// Plan, partition, optionally execute, and write the receipt.
#[instrument(skip_all, fields(apply = options.apply))]
pub fn setup(root: &Path, options: SetupOptions) -> Result<SetupOutcome> {
    let workspace = Workspace::load(root)?;
    let report = workspace.runtime()?.plan().context("plan")?;
    let executor = workspace.executor();
    let allowlist = setup_allowlist();
    let evaluation = evaluate_setup_steps(&report.steps, &allowlist, &executor.supported_actions());

    let executed = if options.apply {
        run_setup(&evaluation, &executor)
    } else {
        Vec::new()
    };

    let runs_dir = workspace.runs_dir();
    let run_id = new_run_id(&runs_dir, Utc::now());
    let receipt = SetupReceipt::new(
        run_id,
        options.apply,
        &allowlist,
        &report.steps,
        &evaluation,
        executed,
    );
    let receipt_path = write_receipt(&runs_dir, &receipt)?;
    info!(
        run_id = %receipt.run_id,
        status = ?receipt.status,
        executable = evaluation.executable.len(),
        skipped = evaluation.skipped.len(),
        manual = evaluation.manual.len(),
        "setup finished"
    );
    Ok(SetupOutcome {
        evaluation,
        receipt,
        receipt_path,
    })
}
