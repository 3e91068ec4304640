//! Declarative state reconciliation CLI.
//!
//! Reads `.reconcile/config.toml` and the desired profile from the current
//! directory, reports drift between observed and desired state, and runs
//! allowlisted remediation steps.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use reconcile::exit_codes;
use reconcile::io::init::{InitOptions, init_workspace};
use reconcile::logging;
use reconcile::render::{render_catalog, render_plan, render_setup, render_sweep};
use reconcile::setup::ReceiptStatus;
use reconcile::workspace::{self, SetupOptions};

#[derive(Parser)]
#[command(
    name = "reconcile",
    version,
    about = "Reconcile observed state against a desired profile"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.reconcile/` with a default config and an empty profile.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Observe every agent and report health checks (worst first).
    Sweep {
        /// Print the sweep report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Diff desired against observed state and list remediation steps.
    Plan {
        /// Print the plan report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Partition the plan and record a receipt; `--apply` runs allowlisted steps.
    Setup {
        /// Execute allowlisted automated steps (default is a dry run).
        #[arg(long)]
        apply: bool,
        /// Also list steps that require manual action.
        #[arg(long)]
        show_manual: bool,
        /// Print the receipt as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List catalogued actions and whether setup may run them unattended.
    Catalog,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = std::env::current_dir().context("resolve current directory")?;
    match cli.command {
        Command::Init { force } => cmd_init(root, force),
        Command::Sweep { json } => {
            let report = workspace::sweep(&root)?;
            emit(&report, json, || render_sweep(&report))?;
            Ok(exit_codes::OK)
        }
        Command::Plan { json } => {
            let report = workspace::plan(&root)?;
            emit(&report, json, || render_plan(&report))?;
            Ok(exit_codes::OK)
        }
        Command::Setup {
            apply,
            show_manual,
            json,
        } => {
            let outcome = workspace::setup(&root, SetupOptions { apply })?;
            emit(&outcome.receipt, json, || render_setup(&outcome, show_manual))?;
            if outcome.receipt.status == ReceiptStatus::Fail {
                return Ok(exit_codes::SETUP_FAILED);
            }
            Ok(exit_codes::OK)
        }
        Command::Catalog => {
            print!("{}", render_catalog());
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_init(root: PathBuf, force: bool) -> Result<i32> {
    let paths = init_workspace(&root, &InitOptions { force })?;
    println!("initialized {}", paths.reconcile_dir.display());
    Ok(exit_codes::OK)
}

/// Print `value` as pretty JSON, or the text rendering.
fn emit<T: Serialize>(value: &T, json: bool, text: impl FnOnce() -> String) -> Result<()> {
    if json {
        let payload = serde_json::to_string_pretty(value).context("serialize json")?;
        println!("{payload}");
    } else {
        print!("{}", text());
    }
    Ok(())
}
