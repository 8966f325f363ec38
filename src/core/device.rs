//! Attached Android devices.

use std::fmt;

use serde::Serialize;

/// Opaque device serial as printed by `adb devices`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct DeviceHandle(String);

impl DeviceHandle {
    pub fn new(serial: impl Into<String>) -> Self {
        DeviceHandle(serial.into())
    }

    pub fn serial(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
