//! Command implementations

pub mod completions;
pub mod deploy;
pub mod doctor;
pub mod probe;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use meshdeploy::util::config::{load_project_config, Config};
use meshdeploy::util::context::DeployContext;
use meshdeploy::util::shell::Shell;

/// Everything a command needs about the project it runs in.
pub struct Session {
    pub root: PathBuf,
    pub config: Config,
    pub ctx: DeployContext,
}

impl Session {
    /// Resolve the project root and load its configuration.
    pub fn open(shell: &Arc<Shell>, root: Option<&Path>) -> Result<Self> {
        let root = match root {
            Some(root) => root.to_path_buf(),
            None => std::env::current_dir().context("failed to determine the current directory")?,
        };
        if !root.is_dir() {
            bail!("project root `{}` is not a directory", root.display());
        }

        let config = load_project_config(&root);
        let ctx = DeployContext::host(Arc::clone(shell), config.tools.resolve());
        Ok(Session { root, config, ctx })
    }
}
