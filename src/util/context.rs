//! Shared context for a deployment run.
//!
//! Bundles the host seam, the output shell and the resolved tool names so
//! every stage receives the same view of the machine.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::DeployError;
use crate::util::config::Tools;
use crate::util::shell::Shell;
use crate::util::system::{HostSystem, System};

/// Context threaded through every stage call.
#[derive(Clone)]
pub struct DeployContext {
    pub system: Arc<dyn System>,
    pub shell: Arc<Shell>,
    pub tools: Tools,
}

impl DeployContext {
    pub fn new(system: Arc<dyn System>, shell: Arc<Shell>, tools: Tools) -> Self {
        DeployContext {
            system,
            shell,
            tools,
        }
    }

    /// Context backed by the real operating system.
    pub fn host(shell: Arc<Shell>, tools: Tools) -> Self {
        Self::new(Arc::new(HostSystem), shell, tools)
    }

    pub fn system(&self) -> &dyn System {
        self.system.as_ref()
    }

    /// Whether a tool can be found.
    pub fn has_tool(&self, name: &str) -> bool {
        self.system.find_executable(name).is_some()
    }

    /// Locate a tool that the current stage cannot do without.
    pub fn require_tool(&self, name: &str, hint: &'static str) -> Result<PathBuf, DeployError> {
        self.system
            .find_executable(name)
            .ok_or_else(|| DeployError::ToolNotFound {
                tool: name.to_string(),
                hint,
            })
    }
}

impl std::fmt::Debug for DeployContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployContext")
            .field("shell", &self.shell)
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}
