//! Observed-state store: one JSON document per agent under `state_dir`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use super::config::validate_agent_id;
use super::files::write_json_atomic;
use crate::core::json::JsonValue;

#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<state_dir>/<agent_id>.json`.
    pub fn path_for(&self, agent_id: &str) -> Result<PathBuf> {
        validate_agent_id(agent_id)?;
        Ok(self.dir.join(format!("{agent_id}.json")))
    }

    /// Read the stored document; `Ok(None)` when nothing is stored.
    pub fn read(&self, agent_id: &str) -> Result<Option<JsonValue>> {
        let path = self.path_for(agent_id)?;
        read_json_file(&path)
    }

    pub fn write(&self, agent_id: &str, value: &JsonValue) -> Result<PathBuf> {
        let path = self.path_for(agent_id)?;
        debug!(agent = agent_id, path = %path.display(), "writing observed state");
        write_json_atomic(&path, value)
            .with_context(|| format!("write observed state {}", path.display()))?;
        Ok(path)
    }

    /// Remove the stored document. Returns whether a file was deleted.
    pub fn clear(&self, agent_id: &str) -> Result<bool> {
        let path = self.path_for(agent_id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(agent = agent_id, "cleared observed state");
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
        }
    }
}

/// Read and parse a JSON file; `Ok(None)` when it does not exist.
pub fn read_json_file(path: &Path) -> Result<Option<JsonValue>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).with_context(|| format!("read {}", path.display())),
    };
    let value: JsonValue =
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(value))
}
