//! Workspace layout and `.reconcile/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::info;

use super::config::{ReconcileConfig, write_config};
use super::profile_store::write_profile;
use crate::core::state::Profile;

/// Canonical paths for a workspace root.
#[derive(Debug, Clone)]
pub struct ReconcilePaths {
    pub root: PathBuf,
    pub reconcile_dir: PathBuf,
    pub config_path: PathBuf,
    pub gitignore_path: PathBuf,
}

impl ReconcilePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let reconcile_dir = root.join(".reconcile");
        Self {
            root: root.clone(),
            reconcile_dir: reconcile_dir.clone(),
            config_path: reconcile_dir.join("config.toml"),
            gitignore_path: reconcile_dir.join(".gitignore"),
        }
    }

    /// Resolve a configured path against the workspace root.
    pub fn resolve(&self, configured: &str) -> PathBuf {
        let path = Path::new(configured);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn profile_path(&self, cfg: &ReconcileConfig) -> PathBuf {
        self.resolve(&cfg.profile)
    }

    pub fn state_dir(&self, cfg: &ReconcileConfig) -> PathBuf {
        self.resolve(&cfg.state_dir)
    }

    pub fn runs_dir(&self, cfg: &ReconcileConfig) -> PathBuf {
        self.resolve(&cfg.runs_dir)
    }
}

/// Options for `init_workspace`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing scaffolding files.
    pub force: bool,
}

/// Create `.reconcile/` scaffolding in `root`: default config, an empty
/// profile, and the state and runs directories.
///
/// Fails if `.reconcile/` already exists unless `options.force` is set.
pub fn init_workspace(root: &Path, options: &InitOptions) -> Result<ReconcilePaths> {
    let paths = ReconcilePaths::new(root);
    if paths.reconcile_dir.exists() && !paths.reconcile_dir.is_dir() {
        return Err(anyhow!(
            "reconcile init: .reconcile exists but is not a directory"
        ));
    }
    if paths.reconcile_dir.exists() && !options.force {
        return Err(anyhow!(
            "reconcile init: .reconcile already exists (use --force to overwrite)"
        ));
    }

    let cfg = ReconcileConfig::default();
    create_dir(&paths.reconcile_dir)?;
    create_dir(&paths.state_dir(&cfg))?;
    create_dir(&paths.runs_dir(&cfg))?;

    write_config(&paths.config_path, &cfg)?;
    write_profile(&paths.profile_path(&cfg), &Profile::new("default"))?;
    fs::write(&paths.gitignore_path, RECONCILE_GITIGNORE)
        .with_context(|| format!("write file {}", paths.gitignore_path.display()))?;

    info!(root = %root.display(), "initialized workspace");
    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

const RECONCILE_GITIGNORE: &str = "runs/\n";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::load_config;
    use crate::io::profile_store::load_profile;

    /// Verifies init_workspace creates config, profile and directories.
    #[test]
    fn init_creates_expected_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_workspace(temp.path(), &InitOptions { force: false }).expect("init");

        let cfg = load_config(&paths.config_path).expect("config");
        assert_eq!(cfg, ReconcileConfig::default());
        assert!(paths.state_dir(&cfg).is_dir());
        assert!(paths.runs_dir(&cfg).is_dir());
        let profile = load_profile(&paths.profile_path(&cfg))
            .expect("load profile")
            .expect("profile present");
        assert_eq!(profile.id, "default");
        assert_eq!(
            fs::read_to_string(&paths.gitignore_path).expect("gitignore"),
            RECONCILE_GITIGNORE
        );
    }

    /// Verifies init refuses to overwrite without --force.
    #[test]
    fn init_without_force_refuses_existing_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_workspace(temp.path(), &InitOptions { force: false }).expect("init");
        let err = init_workspace(temp.path(), &InitOptions { force: false }).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        init_workspace(temp.path(), &InitOptions { force: true }).expect("forced init");
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let paths = ReconcilePaths::new("/work");
        assert_eq!(paths.resolve("/abs/x"), PathBuf::from("/abs/x"));
        assert_eq!(paths.resolve("rel/x"), PathBuf::from("/work/rel/x"));
    }
}
