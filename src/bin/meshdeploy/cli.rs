//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use meshdeploy::core::{RoleOverrides, SerialEndpoint, Variant};
use meshdeploy::ops::DeployOptions;
use meshdeploy::stages::mobile_install::InstallMode;
use meshdeploy::util::shell::{ColorChoice, Shell};

/// meshdeploy - flash a two-node ESP32 mesh and install its Android companion app
///
/// Without a subcommand, runs `deploy`.
#[derive(Parser)]
#[command(name = "meshdeploy")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub deploy: DeployArgs,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Show every command as it runs
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Coloring: auto, always, never
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    pub color: ColorChoice,

    /// Output format for messages
    #[arg(long, global = true, value_enum, default_value_t = MessageFormat::Human)]
    pub message_format: MessageFormat,
}

impl GlobalArgs {
    pub fn shell(&self) -> Shell {
        Shell::from_flags(
            self.quiet,
            self.verbose,
            self.color,
            self.message_format == MessageFormat::Json,
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum MessageFormat {
    Human,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Flash both nodes, then build and install the app (default)
    Deploy(DeployArgs),

    /// Show discovered ports, the node mapping and Android devices
    Probe(ProbeArgs),

    /// Check that the required tools and the SDK are available
    Doctor(DoctorArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Clone, Default)]
pub struct ProjectArgs {
    /// Project root (defaults to the current directory)
    #[arg(long, value_name = "DIR", env = "MESHDEPLOY_ROOT")]
    pub root: Option<PathBuf>,
}

#[derive(Args, Clone, Default)]
pub struct TargetArgs {
    /// Serial port of the primary (coordinator) node
    #[arg(long, value_name = "PORT")]
    pub port_primary: Option<PathBuf>,

    /// Serial port of the secondary (client) node
    #[arg(long, value_name = "PORT")]
    pub port_secondary: Option<PathBuf>,

    /// PlatformIO environment of the primary node
    #[arg(long, value_name = "ENV")]
    pub env_primary: Option<String>,

    /// PlatformIO environment of the secondary node
    #[arg(long, value_name = "ENV")]
    pub env_secondary: Option<String>,
}

impl TargetArgs {
    pub fn apply(&self, opts: &mut DeployOptions) {
        opts.overrides = RoleOverrides {
            primary: self.port_primary.clone().map(SerialEndpoint::new),
            secondary: self.port_secondary.clone().map(SerialEndpoint::new),
        };
        if self.env_primary.is_some() {
            opts.primary_env = self.env_primary.clone();
        }
        if self.env_secondary.is_some() {
            opts.secondary_env = self.env_secondary.clone();
        }
    }
}

#[derive(Args, Clone, Default)]
pub struct DeployArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    #[command(flatten)]
    pub targets: TargetArgs,

    /// Android SDK root (overrides ANDROID_SDK_ROOT and ANDROID_HOME)
    #[arg(long, value_name = "PATH")]
    pub sdk: Option<PathBuf>,

    /// Android build variant: debug or release
    #[arg(long, value_name = "VARIANT")]
    pub variant: Option<Variant>,

    /// Install every APK matching --apk-glob instead of the built one
    #[arg(long)]
    pub glob_install: bool,

    /// APK pattern for --glob-install, relative to the project root
    #[arg(long, value_name = "PATTERN", requires = "glob_install")]
    pub apk_glob: Option<String>,

    /// Do not build or flash the ESP32 nodes
    #[arg(long)]
    pub skip_firmware: bool,

    /// Do not build or install the Android app
    #[arg(long)]
    pub skip_mobile: bool,

    /// Do not launch the app after installing
    #[arg(long)]
    pub no_launch: bool,

    /// Require --port-primary and --port-secondary instead of guessing
    #[arg(long)]
    pub strict_roles: bool,
}

impl DeployArgs {
    /// Layer the flags over options loaded from configuration.
    pub fn apply(&self, opts: &mut DeployOptions, default_glob: String) {
        self.targets.apply(opts);
        if self.sdk.is_some() {
            opts.sdk = self.sdk.clone();
        }
        if let Some(variant) = self.variant {
            opts.variant = variant;
        }
        if self.glob_install {
            opts.install = InstallMode::Glob(self.apk_glob.clone().unwrap_or(default_glob));
        }
        opts.skip_firmware = self.skip_firmware;
        opts.skip_mobile = self.skip_mobile;
        if self.no_launch {
            opts.launch = false;
        }
        opts.strict_roles = self.strict_roles;
    }
}

#[derive(Args)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    #[command(flatten)]
    pub targets: TargetArgs,
}

#[derive(Args)]
pub struct DoctorArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Android SDK root to check
    #[arg(long, value_name = "PATH")]
    pub sdk: Option<PathBuf>,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
