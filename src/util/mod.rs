//! Shared utilities

pub mod config;
pub mod context;
pub mod diagnostic;
pub mod fs;
pub mod process;
pub mod shell;
pub mod system;

pub use config::Config;
pub use context::DeployContext;
pub use diagnostic::Diagnostic;
pub use shell::Shell;
pub use system::{HostSystem, System};
