//! Firmware build and upload through PlatformIO.
//!
//! The port is reclaimed between build and upload so nothing reopens it in
//! the meantime. Any non-zero exit from `pio` aborts the run.

use anyhow::Result;
use serde::Serialize;

use crate::contention::{self, Reclaim};
use crate::core::{BuildTarget, Environment, Role, SerialEndpoint};
use crate::util::context::DeployContext;
use crate::util::diagnostic::suggestions;
use crate::util::process::{self, ProcessBuilder};
use crate::util::shell::Status;

/// Result of flashing one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirmwareReport {
    pub role: Role,
    pub endpoint: SerialEndpoint,
    pub env: Environment,
    pub port: Reclaim,
}

/// `pio run -d DIR [-e ENV]`
pub fn build_command(pio: impl AsRef<std::path::Path>, target: &BuildTarget) -> ProcessBuilder {
    ProcessBuilder::new(pio)
        .args(["run", "-d"])
        .arg(target.dir())
        .args(target.env().as_args())
}

/// `pio run -d DIR --target upload --upload-port PORT [-e ENV]`
pub fn upload_command(
    pio: impl AsRef<std::path::Path>,
    target: &BuildTarget,
    port: &SerialEndpoint,
) -> ProcessBuilder {
    ProcessBuilder::new(pio)
        .args(["run", "-d"])
        .arg(target.dir())
        .args(["--target", "upload", "--upload-port"])
        .arg(port.path())
        .args(target.env().as_args())
}

/// Build `target`, free `port`, then upload to it.
pub fn flash(ctx: &DeployContext, target: &BuildTarget, port: &SerialEndpoint) -> Result<FirmwareReport> {
    let pio = ctx.require_tool(&ctx.tools.pio, suggestions::INSTALL_PLATFORMIO)?;
    let role = target.role();

    let span = ctx.shell.span(
        Status::Building,
        format!(
            "{} firmware ({}) in {} [env: {}]",
            role,
            role.description(),
            target.dir().display(),
            target.env()
        ),
    );
    process::run_checked(ctx.system(), &build_command(&pio, target))?;
    span.finish_with_message(format!("{} firmware", role));

    let reclaimed = contention::reclaim(ctx, port);

    let span = ctx
        .shell
        .span(Status::Flashing, format!("{} node via {}", role, port));
    process::run_checked(ctx.system(), &upload_command(&pio, target, port))?;
    span.finish_with_message(format!("upload to {}", port));
    ctx.shell.status(Status::Flashed, format!("{} node on {}", role, port));

    Ok(FirmwareReport {
        role,
        endpoint: port.clone(),
        env: target.env().clone(),
        port: reclaimed,
    })
}
