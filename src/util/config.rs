//! Configuration file support for meshdeploy.
//!
//! meshdeploy supports two configuration file locations:
//! - Global: `~/.meshdeploy/config.toml` - User-wide defaults (tool names, SDK)
//! - Project: `meshdeploy.toml` at the project root - Layout of this checkout
//!
//! Project config takes precedence over global config, and command-line flags
//! take precedence over both.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Project config file name, looked up at the project root.
pub const PROJECT_CONFIG_FILE: &str = "meshdeploy.toml";

/// Default firmware directory of the primary (coordinator) node.
pub const DEFAULT_PRIMARY_DIR: &str = ".";

/// Default firmware directory of the secondary (client) node.
pub const DEFAULT_SECONDARY_DIR: &str = "esp32_b_project";

/// Default Android project directory.
pub const DEFAULT_MOBILE_DIR: &str = "android";

/// Default pattern for glob install mode, relative to the project root.
pub const DEFAULT_APK_GLOB: &str = "android/app/build/outputs/apk/debug/*.apk";

/// meshdeploy configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Firmware project settings
    pub firmware: FirmwareConfig,

    /// Android project settings
    pub mobile: MobileConfig,

    /// External tool names
    pub tools: ToolsConfig,
}

/// Firmware project layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmwareConfig {
    /// PlatformIO project of the primary node, relative to the root
    pub primary_dir: Option<PathBuf>,

    /// PlatformIO project of the secondary node, relative to the root
    pub secondary_dir: Option<PathBuf>,

    /// PlatformIO environment for the primary node
    pub primary_env: Option<String>,

    /// PlatformIO environment for the secondary node
    pub secondary_env: Option<String>,
}

/// Android project settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MobileConfig {
    /// Gradle project directory, relative to the root
    pub project_dir: Option<PathBuf>,

    /// Default build variant (debug, release)
    pub variant: Option<String>,

    /// Pattern used by glob install mode
    pub apk_glob: Option<String>,

    /// Android SDK root
    pub sdk: Option<PathBuf>,

    /// Launch the app after installing
    pub launch: Option<bool>,
}

/// Names (or paths) of the external tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub pio: Option<String>,
    pub adb: Option<String>,
    pub lsof: Option<String>,
    pub fuser: Option<String>,
}

impl ToolsConfig {
    /// Resolve configured names, falling back to the stock tool names.
    pub fn resolve(&self) -> Tools {
        let defaults = Tools::default();
        Tools {
            pio: self.pio.clone().unwrap_or(defaults.pio),
            adb: self.adb.clone().unwrap_or(defaults.adb),
            lsof: self.lsof.clone().unwrap_or(defaults.lsof),
            fuser: self.fuser.clone().unwrap_or(defaults.fuser),
        }
    }
}

/// Resolved external tool names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tools {
    /// PlatformIO CLI
    pub pio: String,
    /// Android debug bridge
    pub adb: String,
    /// File-handle listing tool
    pub lsof: String,
    /// Alternate ownership tool
    pub fuser: String,
}

impl Default for Tools {
    fn default() -> Self {
        Tools {
            pio: "pio".to_string(),
            adb: "adb".to_string(),
            lsof: "lsof".to_string(),
            fuser: "fuser".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        // Firmware settings
        if other.firmware.primary_dir.is_some() {
            self.firmware.primary_dir = other.firmware.primary_dir;
        }
        if other.firmware.secondary_dir.is_some() {
            self.firmware.secondary_dir = other.firmware.secondary_dir;
        }
        if other.firmware.primary_env.is_some() {
            self.firmware.primary_env = other.firmware.primary_env;
        }
        if other.firmware.secondary_env.is_some() {
            self.firmware.secondary_env = other.firmware.secondary_env;
        }

        // Mobile settings
        if other.mobile.project_dir.is_some() {
            self.mobile.project_dir = other.mobile.project_dir;
        }
        if other.mobile.variant.is_some() {
            self.mobile.variant = other.mobile.variant;
        }
        if other.mobile.apk_glob.is_some() {
            self.mobile.apk_glob = other.mobile.apk_glob;
        }
        if other.mobile.sdk.is_some() {
            self.mobile.sdk = other.mobile.sdk;
        }
        if other.mobile.launch.is_some() {
            self.mobile.launch = other.mobile.launch;
        }

        // Tool names
        if other.tools.pio.is_some() {
            self.tools.pio = other.tools.pio;
        }
        if other.tools.adb.is_some() {
            self.tools.adb = other.tools.adb;
        }
        if other.tools.lsof.is_some() {
            self.tools.lsof = other.tools.lsof;
        }
        if other.tools.fuser.is_some() {
            self.tools.fuser = other.tools.fuser;
        }
    }

    /// Primary node firmware directory, relative to the root.
    pub fn primary_dir(&self) -> PathBuf {
        self.firmware
            .primary_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PRIMARY_DIR))
    }

    /// Secondary node firmware directory, relative to the root.
    pub fn secondary_dir(&self) -> PathBuf {
        self.firmware
            .secondary_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SECONDARY_DIR))
    }

    /// Android project directory, relative to the root.
    pub fn mobile_dir(&self) -> PathBuf {
        self.mobile
            .project_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MOBILE_DIR))
    }

    /// Pattern for glob install mode.
    pub fn apk_glob(&self) -> String {
        self.mobile
            .apk_glob
            .clone()
            .unwrap_or_else(|| DEFAULT_APK_GLOB.to_string())
    }

    /// Whether to launch the app after installing.
    pub fn launch(&self) -> bool {
        self.mobile.launch.unwrap_or(true)
    }
}

/// Get the global meshdeploy config directory (~/.meshdeploy).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".meshdeploy"))
}

/// Get the global config path (~/.meshdeploy/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (`<root>/meshdeploy.toml`).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_CONFIG_FILE)
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (meshdeploy.toml)
/// 2. Global config (~/.meshdeploy/config.toml)
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        if global_path.exists() {
            config.merge(Config::load_or_default(global_path));
        }
    }

    if project_path.exists() {
        config.merge(Config::load_or_default(project_path));
    }

    config
}

/// Load configuration for a project root from the standard locations.
pub fn load_project_config(project_root: &Path) -> Config {
    let global = global_config_path();
    load_config(global.as_deref(), &project_config_path(project_root))
}
