//! Built-in action handlers for the catalog actions.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use super::process::run_command_with_timeout;
use super::state_store::{StateStore, read_json_file};
use crate::catalog::{COMMAND_RUN, STATE_CLEAR, STATE_SNAPSHOT, STATE_VERIFY};
use crate::core::types::PlanStep;
use crate::dispatch::{ActionHandlerRegistry, ConfigBag};

/// Workspace settings the handlers fall back on.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub command_timeout: Duration,
    pub output_limit_bytes: usize,
}

impl HandlerContext {
    fn resolve(&self, configured: &str) -> PathBuf {
        let path = Path::new(configured);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn store(&self, config: &ConfigBag) -> StateStore {
        match config.string_non_empty("state_dir") {
            Some(dir) => StateStore::new(self.resolve(dir)),
            None => StateStore::new(&self.state_dir),
        }
    }
}

/// Registry with a handler for every catalog action.
pub fn default_registry(ctx: &HandlerContext) -> ActionHandlerRegistry {
    let mut registry = ActionHandlerRegistry::new();

    let snapshot_ctx = ctx.clone();
    registry.register(STATE_SNAPSHOT, move |config: &ConfigBag, _step: &PlanStep| {
        state_snapshot(&snapshot_ctx, config)
    });
    let verify_ctx = ctx.clone();
    registry.register(STATE_VERIFY, move |config: &ConfigBag, _step: &PlanStep| {
        state_verify(&verify_ctx, config)
    });
    let clear_ctx = ctx.clone();
    registry.register(STATE_CLEAR, move |config: &ConfigBag, _step: &PlanStep| {
        state_clear(&clear_ctx, config)
    });
    let command_ctx = ctx.clone();
    registry.register(COMMAND_RUN, move |config: &ConfigBag, _step: &PlanStep| {
        command_run(&command_ctx, config)
    });

    registry
}

fn required<'a>(config: &'a ConfigBag, key: &str) -> Result<&'a str> {
    config
        .string_non_empty(key)
        .ok_or_else(|| anyhow!("config key '{key}' is required"))
}

fn state_snapshot(ctx: &HandlerContext, config: &ConfigBag) -> Result<Option<i32>> {
    let agent_id = required(config, "agent_id")?;
    let source = ctx.resolve(required(config, "source")?);
    let value = read_json_file(&source)?
        .ok_or_else(|| anyhow!("snapshot source not found: {}", source.display()))?;
    let path = ctx.store(config).write(agent_id, &value)?;
    info!(agent = agent_id, path = %path.display(), "stored observed state snapshot");
    Ok(Some(0))
}

fn state_verify(ctx: &HandlerContext, config: &ConfigBag) -> Result<Option<i32>> {
    let agent_id = required(config, "agent_id")?;
    match ctx.store(config).read(agent_id) {
        Ok(Some(_)) => Ok(Some(0)),
        Ok(None) => {
            warn!(agent = agent_id, "no stored observed state");
            Ok(Some(1))
        }
        Err(err) => {
            warn!(agent = agent_id, error = %format!("{err:#}"), "stored observed state unreadable");
            Ok(Some(1))
        }
    }
}

fn state_clear(ctx: &HandlerContext, config: &ConfigBag) -> Result<Option<i32>> {
    let agent_id = required(config, "agent_id")?;
    let removed = ctx.store(config).clear(agent_id)?;
    debug!(agent = agent_id, removed, "state.clear finished");
    Ok(Some(0))
}

fn command_run(ctx: &HandlerContext, config: &ConfigBag) -> Result<Option<i32>> {
    let program = required(config, "program")?;
    let args = config.string_array("args").unwrap_or_default();
    let timeout = config
        .int("timeout_secs")
        .filter(|secs| *secs > 0)
        .map(|secs| Duration::from_secs(secs.unsigned_abs()))
        .unwrap_or(ctx.command_timeout);

    let mut cmd = Command::new(program);
    cmd.args(&args);
    let workdir = config
        .string_non_empty("workdir")
        .map(|dir| ctx.resolve(dir))
        .unwrap_or_else(|| ctx.root.clone());
    cmd.current_dir(&workdir);

    let output = run_command_with_timeout(cmd, timeout, ctx.output_limit_bytes)
        .with_context(|| format!("run {program}"))?;
    if output.timed_out {
        return Err(anyhow!(
            "{program} timed out after {}s",
            timeout.as_secs()
        ));
    }
    let code = output.exit_code();
    if code != 0 {
        warn!(
            program,
            code,
            stderr = %String::from_utf8_lossy(&output.stderr),
            "command exited non-zero"
        );
    }
    Ok(Some(code))
}
