//! meshdeploy - deployment orchestrator for a two-node ESP32 mesh and its
//! Android companion app.
//!
//! This crate provides the library behind the `meshdeploy` binary:
//! discovery of serial endpoints and Android devices, serial port
//! contention resolution, firmware flashing through PlatformIO and the
//! Gradle/adb mobile pipeline.

pub mod contention;
pub mod core;
pub mod discovery;
pub mod error;
pub mod ops;
pub mod stages;
pub mod util;

/// Test utilities and mocks for meshdeploy unit tests.
///
/// This module is only available when compiling with `--cfg test`. It
/// provides a scripted [`System`](util::system::System) implementation.
#[cfg(test)]
pub mod test_support;

pub use crate::core::{Artifact, BuildTarget, DeviceHandle, Role, SerialEndpoint, Variant};
pub use error::DeployError;
pub use util::context::DeployContext;
