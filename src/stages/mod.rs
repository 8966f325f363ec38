//! Deployment stages.
//!
//! Each stage drives one external toolchain. Stages take a
//! [`DeployContext`](crate::util::context::DeployContext) and explicit
//! inputs; none of them reads global state or mutates the process
//! environment.

pub mod firmware;
pub mod mobile_build;
pub mod mobile_install;
