//! Agents built from workspace configuration.

use crate::agent::Agent;
use crate::io::config::ReconcileConfig;
use crate::io::init::ReconcilePaths;
use crate::io::state_store::StateStore;

use anyhow::Result;

pub mod file;

pub use file::FileStateAgent;

/// One [`FileStateAgent`] per `[[agent]]` table, in config order.
///
/// An agent without an explicit `state` path reads `<state_dir>/<id>.json`.
pub fn build_agents(cfg: &ReconcileConfig, paths: &ReconcilePaths) -> Result<Vec<Box<dyn Agent>>> {
    let store = StateStore::new(paths.state_dir(cfg));
    let mut agents: Vec<Box<dyn Agent>> = Vec::with_capacity(cfg.agents.len());
    for agent in &cfg.agents {
        let state_path = match &agent.state {
            Some(path) => paths.resolve(path),
            None => store.path_for(&agent.id)?,
        };
        agents.push(Box::new(FileStateAgent::new(
            &agent.id,
            state_path,
            agent.tasks.clone(),
        )));
    }
    Ok(agents)
}
