//! Implementation of `meshdeploy deploy`.
//!
//! Firmware first (primary, then secondary), then the mobile app. A stage
//! that cannot run for lack of a port or device is skipped with a warning;
//! a stage that runs and fails ends the whole deployment.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::{map_roles, BuildTarget, DeviceHandle, Role, RoleMap, RoleOverrides, SerialEndpoint, Variant};
use crate::discovery::{discover_devices, discover_endpoints};
use crate::error::DeployError;
use crate::stages::firmware::{self, FirmwareReport};
use crate::stages::mobile_build::{locate_sdk, MobileProject};
use crate::stages::mobile_install::{self, DeviceReport, InstallMode, InstallPlan};
use crate::util::config::Config;
use crate::util::context::DeployContext;
use crate::util::shell::Status;

/// Options for the deploy command.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Project root; relative directories below resolve against it
    pub root: PathBuf,

    /// Explicit serial ports per role
    pub overrides: RoleOverrides,

    /// PlatformIO environment of the primary node
    pub primary_env: Option<String>,

    /// PlatformIO environment of the secondary node
    pub secondary_env: Option<String>,

    /// Firmware project of the primary node
    pub primary_dir: PathBuf,

    /// Firmware project of the secondary node
    pub secondary_dir: PathBuf,

    /// Android project
    pub mobile_dir: PathBuf,

    /// Android SDK override
    pub sdk: Option<PathBuf>,

    /// Build variant of the app
    pub variant: Variant,

    /// Which APKs to install
    pub install: InstallMode,

    pub skip_firmware: bool,
    pub skip_mobile: bool,

    /// Launch the app after installing
    pub launch: bool,

    /// Refuse to guess which port belongs to which node
    pub strict_roles: bool,
}

impl DeployOptions {
    /// Defaults for `root`, taken from the loaded configuration.
    pub fn from_config(root: impl Into<PathBuf>, config: &Config) -> Result<Self> {
        let variant = match &config.mobile.variant {
            Some(v) => v
                .parse::<Variant>()
                .map_err(anyhow::Error::msg)
                .context("invalid `[mobile] variant` in configuration")?,
            None => Variant::default(),
        };

        Ok(DeployOptions {
            root: root.into(),
            overrides: RoleOverrides::default(),
            primary_env: config.firmware.primary_env.clone(),
            secondary_env: config.firmware.secondary_env.clone(),
            primary_dir: config.primary_dir(),
            secondary_dir: config.secondary_dir(),
            mobile_dir: config.mobile_dir(),
            sdk: config.mobile.sdk.clone(),
            variant,
            install: InstallMode::Single,
            skip_firmware: false,
            skip_mobile: false,
            launch: config.launch(),
            strict_roles: false,
        })
    }

    fn resolve(&self, dir: &Path) -> PathBuf {
        self.root.join(dir)
    }

    pub fn mobile_project(&self) -> MobileProject {
        MobileProject::new(self.resolve(&self.mobile_dir))
    }

    /// Build target of `role`, environment resolved from its project.
    pub fn build_target(&self, role: Role) -> BuildTarget {
        let (dir, env) = match role {
            Role::Primary => (&self.primary_dir, &self.primary_env),
            Role::Secondary => (&self.secondary_dir, &self.secondary_env),
        };
        BuildTarget::resolve(role, self.resolve(dir), env.as_deref())
    }
}

/// Where each node would be flashed.
#[derive(Debug, Clone, Serialize)]
pub struct FirmwarePlan {
    pub endpoints: Vec<SerialEndpoint>,
    pub roles: RoleMap,
    pub targets: Vec<BuildTarget>,
}

impl FirmwarePlan {
    /// Endpoint for `role`, if one was assigned.
    pub fn endpoint(&self, role: Role) -> Option<&SerialEndpoint> {
        self.roles.get(role).map(|a| a.endpoint())
    }
}

/// Discover endpoints and decide which node goes where.
pub fn plan_firmware(ctx: &DeployContext, opts: &DeployOptions) -> FirmwarePlan {
    let endpoints = discover_endpoints(ctx.system());
    let roles = map_roles(&endpoints, &opts.overrides);
    let targets = Role::ALL.into_iter().map(|r| opts.build_target(r)).collect();
    FirmwarePlan {
        endpoints,
        roles,
        targets,
    }
}

/// Per-node result of the firmware stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum FirmwareOutcome {
    Flashed(FirmwareReport),
    Skipped { role: Role },
}

/// Result of the mobile stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MobileReport {
    pub sdk: PathBuf,
    pub devices: Vec<DeviceReport>,
}

/// Aggregate result of a deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeployReport {
    pub firmware: Vec<FirmwareOutcome>,
    pub mobile: Option<MobileReport>,
}

impl DeployReport {
    /// Number of soft failures (skipped nodes, failed installs or launches).
    pub fn warnings(&self) -> usize {
        let skipped = self
            .firmware
            .iter()
            .filter(|f| matches!(f, FirmwareOutcome::Skipped { .. }))
            .count();
        let devices = self
            .mobile
            .iter()
            .flat_map(|m| &m.devices)
            .filter(|d| !d.all_ok())
            .count();
        skipped + devices
    }
}

/// Run the deployment.
pub fn deploy(ctx: &DeployContext, opts: &DeployOptions) -> Result<DeployReport> {
    let mut report = DeployReport::default();

    if opts.skip_firmware {
        tracing::debug!("firmware stage skipped");
    } else {
        report.firmware = deploy_firmware(ctx, opts)?;
    }

    if opts.skip_mobile {
        tracing::debug!("mobile stage skipped");
    } else {
        report.mobile = Some(deploy_mobile(ctx, opts)?);
    }

    let warnings = report.warnings();
    if warnings == 0 {
        ctx.shell.status(Status::Finished, "deployment");
    } else {
        ctx.shell.status(
            Status::Finished,
            format!("deployment with {} warning(s)", warnings),
        );
    }
    Ok(report)
}

fn deploy_firmware(ctx: &DeployContext, opts: &DeployOptions) -> Result<Vec<FirmwareOutcome>> {
    if opts.strict_roles {
        if let Some(role) = Role::ALL.into_iter().find(|r| opts.overrides.get(*r).is_none()) {
            return Err(DeployError::RoleNotPinned { role }.into());
        }
    }

    let plan = plan_firmware(ctx, opts);
    if plan.endpoints.is_empty() {
        ctx.shell.status(Status::Detected, "no serial ports");
    } else {
        let names: Vec<String> = plan.endpoints.iter().map(ToString::to_string).collect();
        ctx.shell
            .status(Status::Detected, format!("serial ports {}", names.join(", ")));
    }

    for role in plan.roles.discovered_roles() {
        if let Some(endpoint) = plan.endpoint(role) {
            ctx.shell.warn(format!(
                "{} node mapped to {} by port order; pass --port-{} to pin it",
                role, endpoint, role
            ));
        }
    }
    if let (Some(a), Some(b)) = (plan.endpoint(Role::Primary), plan.endpoint(Role::Secondary)) {
        if a == b {
            ctx.shell
                .warn(format!("both nodes are mapped to {}; the second upload will overwrite the first", a));
        }
    }

    let mut outcomes = Vec::new();
    for target in &plan.targets {
        let role = target.role();
        match plan.endpoint(role) {
            Some(endpoint) => {
                let flashed = firmware::flash(ctx, target, endpoint)
                    .with_context(|| format!("failed to flash the {} node", role))?;
                outcomes.push(FirmwareOutcome::Flashed(flashed));
            }
            None => {
                ctx.shell
                    .skip(format!("{} firmware: no serial port found for the {} node", role, role.description()));
                outcomes.push(FirmwareOutcome::Skipped { role });
            }
        }
    }
    Ok(outcomes)
}

fn deploy_mobile(ctx: &DeployContext, opts: &DeployOptions) -> Result<MobileReport> {
    let sdk = locate_sdk(opts.sdk.as_deref())?;
    ctx.shell
        .status(Status::Using, format!("Android SDK at {}", sdk.display()));

    let devices: Vec<DeviceHandle> = discover_devices(ctx);
    if !devices.is_empty() {
        let names: Vec<&str> = devices.iter().map(DeviceHandle::serial).collect();
        ctx.shell
            .status(Status::Detected, format!("Android devices {}", names.join(", ")));
    }

    let project = opts.mobile_project();
    let plan = InstallPlan {
        project: &project,
        root: &opts.root,
        mode: &opts.install,
        variant: opts.variant,
        sdk: &sdk,
        launch: opts.launch,
    };
    let devices = mobile_install::run(ctx, &plan, &devices)?;

    Ok(MobileReport { sdk, devices })
}
