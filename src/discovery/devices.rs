//! Android device listing.
//!
//! Parses `adb devices -l`:
//!
//! ```text
//! List of devices attached
//! R58M123ABC             device usb:1-1 product:beyond1 model:SM_G973F transport_id:3
//! emulator-5554          offline transport_id:1
//! ```

use std::collections::BTreeMap;

use crate::core::DeviceHandle;
use crate::util::context::DeployContext;
use crate::util::process::{self, Outcome, ProcessBuilder};

/// Connection state column of `adb devices`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceState {
    /// `device`: connected and authorized.
    Ready,
    Unauthorized,
    Offline,
    Other(String),
}

impl DeviceState {
    fn parse(token: &str) -> Self {
        match token {
            "device" => DeviceState::Ready,
            "unauthorized" => DeviceState::Unauthorized,
            "offline" => DeviceState::Offline,
            other => DeviceState::Other(other.to_string()),
        }
    }
}

/// One line of `adb devices -l`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub serial: String,
    pub state: DeviceState,
    /// `key:value` pairs such as `model` and `transport_id`.
    pub attributes: BTreeMap<String, String>,
}

impl DeviceRecord {
    pub fn is_ready(&self) -> bool {
        self.state == DeviceState::Ready
    }

    pub fn handle(&self) -> DeviceHandle {
        DeviceHandle::new(&self.serial)
    }

    fn parse(line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace();
        let serial = tokens.next()?;
        let state = DeviceState::parse(tokens.next()?);
        let attributes = tokens
            .filter_map(|t| t.split_once(':'))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Some(DeviceRecord {
            serial: serial.to_string(),
            state,
            attributes,
        })
    }
}

/// Parse the full output of `adb devices [-l]`.
///
/// The header, daemon notices (`* daemon started successfully`) and lines
/// without a state column are skipped.
pub fn parse_device_list(output: &str) -> Vec<DeviceRecord> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("List of devices") && !l.starts_with('*'))
        .filter_map(DeviceRecord::parse)
        .collect()
}

/// Ready devices reported by adb; empty when adb is missing or fails.
pub fn discover_devices(ctx: &DeployContext) -> Vec<DeviceHandle> {
    list_devices(ctx)
        .iter()
        .filter(|r| r.is_ready())
        .map(DeviceRecord::handle)
        .collect()
}

/// Every device adb reports, ready or not.
pub fn list_devices(ctx: &DeployContext) -> Vec<DeviceRecord> {
    let Some(adb) = ctx.system.find_executable(&ctx.tools.adb) else {
        tracing::debug!("`{}` not found; no devices", ctx.tools.adb);
        return Vec::new();
    };

    let cmd = ProcessBuilder::new(adb).args(["devices", "-l"]);
    match process::run_tolerant(ctx.system(), &cmd) {
        Ok(Outcome::Succeeded(output)) => {
            let records = parse_device_list(&output.stdout);
            for record in records.iter().filter(|r| !r.is_ready()) {
                tracing::debug!("ignoring device {} ({:?})", record.serial, record.state);
            }
            records
        }
        Ok(Outcome::FailedTolerated(failure)) | Ok(Outcome::FailedFatal(failure)) => {
            tracing::debug!("device listing failed: {}", failure);
            Vec::new()
        }
        Err(e) => {
            tracing::debug!("device listing failed: {:#}", e);
            Vec::new()
        }
    }
}
