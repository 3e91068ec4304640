//! Desired-state profile storage (JSON).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use super::files::write_json_atomic;
use crate::core::state::Profile;

/// Load the profile; `Ok(None)` when the file does not exist.
pub fn load_profile(path: &Path) -> Result<Option<Profile>> {
    if !path.exists() {
        debug!(path = %path.display(), "no profile");
        return Ok(None);
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read profile {}", path.display()))?;
    let profile: Profile = serde_json::from_str(&contents)
        .with_context(|| format!("parse profile {}", path.display()))?;
    debug!(id = %profile.id, "profile loaded");
    Ok(Some(profile))
}

/// Atomically write the profile.
pub fn write_profile(path: &Path, profile: &Profile) -> Result<()> {
    write_json_atomic(path, profile)
        .with_context(|| format!("write profile {}", path.display()))
}
