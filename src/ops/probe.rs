//! Implementation of `meshdeploy probe`.
//!
//! Shows what a deployment would target without building or flashing.

use std::fmt::Write;

use serde::Serialize;

use crate::core::{DeviceHandle, Role};
use crate::discovery::discover_devices;
use crate::ops::deploy::{plan_firmware, DeployOptions, FirmwarePlan};
use crate::util::context::DeployContext;

/// Discovered resources and the mapping a deploy would use.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    #[serde(flatten)]
    pub firmware: FirmwarePlan,
    pub devices: Vec<DeviceHandle>,
}

/// Discover ports and devices.
pub fn probe(ctx: &DeployContext, opts: &DeployOptions) -> ProbeReport {
    ProbeReport {
        firmware: plan_firmware(ctx, opts),
        devices: discover_devices(ctx),
    }
}

/// Format a probe report for display.
pub fn format_probe(report: &ProbeReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "Serial ports:");
    if report.firmware.endpoints.is_empty() {
        let _ = writeln!(output, "  (none)");
    }
    for endpoint in &report.firmware.endpoints {
        let _ = writeln!(output, "  {}", endpoint);
    }

    let _ = writeln!(output, "\nNodes:");
    for target in &report.firmware.targets {
        let role = target.role();
        let port = match report.firmware.roles.get(role) {
            Some(a) if a.is_discovered() => format!("{} (by port order)", a.endpoint()),
            Some(a) => a.endpoint().to_string(),
            None => "-".to_string(),
        };
        let _ = writeln!(
            output,
            "  {:<9} {:<11} port: {}  env: {}  dir: {}",
            role.as_str(),
            role.description(),
            port,
            target.env(),
            target.dir().display()
        );
    }

    let _ = writeln!(output, "\nAndroid devices:");
    if report.devices.is_empty() {
        let _ = writeln!(output, "  (none)");
    }
    for device in &report.devices {
        let _ = writeln!(output, "  {}", device);
    }

    output
}

impl ProbeReport {
    /// Whether every node has a port.
    pub fn fully_mapped(&self) -> bool {
        Role::ALL.iter().all(|r| self.firmware.roles.get(*r).is_some())
    }
}
