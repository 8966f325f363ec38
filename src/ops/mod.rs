//! High-level operations.
//!
//! This module contains the implementation of meshdeploy commands.

pub mod deploy;
pub mod doctor;
pub mod probe;

pub use deploy::{deploy, DeployOptions, DeployReport, FirmwareOutcome, FirmwarePlan};
pub use doctor::{doctor, format_report, DoctorOptions, DoctorReport};
pub use probe::{format_probe, probe, ProbeReport};
