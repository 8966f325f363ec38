//! Firmware build targets.
//!
//! A [`BuildTarget`] is one PlatformIO project bound to one [`Role`], with
//! the environment it will be built for. It is resolved once per run.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// PlatformIO project file looked up in each firmware directory.
pub const PLATFORMIO_INI: &str = "platformio.ini";

static ENV_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*\[env:([^\]]+)\]").expect("valid env section regex"));

/// Logical deployment role of a firmware node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Mesh coordinator.
    Primary,
    /// Mesh client.
    Secondary,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Primary, Role::Secondary];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Primary => "primary",
            Role::Secondary => "secondary",
        }
    }

    /// What the node does in the mesh.
    pub fn description(&self) -> &'static str {
        match self {
            Role::Primary => "coordinator",
            Role::Secondary => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The PlatformIO environment a target is built for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Named(String),
    /// Nothing declared; PlatformIO picks its own default.
    Unset,
}

impl Environment {
    /// `-e NAME` when named, nothing otherwise.
    pub fn as_args(&self) -> Vec<String> {
        match self {
            Environment::Named(name) => vec!["-e".to_string(), name.clone()],
            Environment::Unset => Vec::new(),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Named(name) => f.write_str(name),
            Environment::Unset => f.write_str("unset"),
        }
    }
}

/// A firmware project resolved for one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildTarget {
    role: Role,
    dir: PathBuf,
    env: Environment,
}

impl BuildTarget {
    /// Resolve the environment for `dir`: an explicit name wins, then the
    /// first `[env:NAME]` section of its `platformio.ini`, else unset.
    pub fn resolve(role: Role, dir: impl Into<PathBuf>, env_override: Option<&str>) -> Self {
        let dir = dir.into();
        let env = match env_override.map(str::trim).filter(|e| !e.is_empty()) {
            Some(name) => Environment::Named(name.to_string()),
            None => read_first_env(&dir)
                .map(Environment::Named)
                .unwrap_or(Environment::Unset),
        };
        BuildTarget { role, dir, env }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }
}

/// Name of the first `[env:NAME]` section in a `platformio.ini` body.
pub fn first_env_section(content: &str) -> Option<String> {
    ENV_SECTION
        .captures(content)
        .map(|caps| caps[1].trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Read the first declared environment from `dir/platformio.ini`.
///
/// A missing or unreadable file counts as "nothing declared".
pub fn read_first_env(dir: &Path) -> Option<String> {
    let ini = dir.join(PLATFORMIO_INI);
    let content = match std::fs::read(&ini) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::debug!("no environment from {}: {}", ini.display(), e);
            return None;
        }
    };
    first_env_section(&content)
}
