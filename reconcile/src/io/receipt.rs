//! Setup receipts: `runs/<run_id>/setup_receipt.v1.json`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::debug;

use super::files::write_json_atomic;
use crate::setup::SetupReceipt;

pub const RECEIPT_FILE_NAME: &str = "setup_receipt.v1.json";

/// Run id for a timestamp, e.g. `2026-01-31_142501`.
pub fn run_id_for(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d_%H%M%S").to_string()
}

/// Run id that does not collide with an existing directory under `runs_dir`.
pub fn new_run_id(runs_dir: &Path, now: DateTime<Utc>) -> String {
    let base = run_id_for(now);
    if !runs_dir.join(&base).exists() {
        return base;
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !runs_dir.join(candidate).exists())
        .unwrap_or(base)
}

pub fn receipt_path(runs_dir: &Path, run_id: &str) -> PathBuf {
    runs_dir.join(run_id).join(RECEIPT_FILE_NAME)
}

/// Atomically write the receipt into its run directory.
pub fn write_receipt(runs_dir: &Path, receipt: &SetupReceipt) -> Result<PathBuf> {
    let path = receipt_path(runs_dir, &receipt.run_id);
    debug!(path = %path.display(), status = ?receipt.status, "writing setup receipt");
    write_json_atomic(&path, receipt)
        .with_context(|| format!("write setup receipt {}", path.display()))?;
    Ok(path)
}

pub fn load_receipt(path: &Path) -> Result<SetupReceipt> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read receipt {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse receipt {}", path.display()))
}
