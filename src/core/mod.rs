//! Core data structures for meshdeploy.
//!
//! This module contains the types the deployment stages pass between each
//! other:
//! - Serial endpoints and device handles produced by discovery
//! - Roles and build targets for the two firmware nodes
//! - Build variants and resolved APK artifacts
//! - The endpoint-to-role mapper

pub mod artifact;
pub mod device;
pub mod endpoint;
pub mod mapper;
pub mod target;

pub use artifact::{Artifact, Variant};
pub use device::DeviceHandle;
pub use endpoint::SerialEndpoint;
pub use mapper::{map_roles, Assignment, RoleMap, RoleOverrides};
pub use target::{BuildTarget, Environment, Role};
