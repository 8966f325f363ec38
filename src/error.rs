//! Fatal deployment errors.
//!
//! Everything here aborts the run. Soft failures (a missing endpoint, one
//! device refusing an install) are warnings and never become a
//! [`DeployError`].

use std::path::PathBuf;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::core::Role;
use crate::util::diagnostic::Diagnostic;
use crate::util::process::CommandFailure;

/// A stage-fatal condition.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum DeployError {
    #[error("{0}")]
    #[diagnostic(code(meshdeploy::command_failed))]
    CommandFailed(Box<CommandFailure>),

    #[error("`{tool}` not found on PATH")]
    #[diagnostic(code(meshdeploy::tool_not_found))]
    ToolNotFound { tool: String, hint: &'static str },

    #[error("Android SDK not found")]
    #[diagnostic(code(meshdeploy::sdk_not_found), help("Pass --sdk, set ANDROID_SDK_ROOT or ANDROID_HOME, or install the SDK to ~/Android/Sdk"))]
    SdkNotFound { searched: Vec<PathBuf> },

    #[error("Gradle wrapper not found at {}", path.display())]
    #[diagnostic(code(meshdeploy::wrapper_not_found), help("Check `[mobile] project_dir` in meshdeploy.toml or run from the project root"))]
    WrapperNotFound { path: PathBuf },

    #[error("no APK found under {} after the build", root.display())]
    #[diagnostic(code(meshdeploy::no_artifacts))]
    NoArtifacts { root: PathBuf },

    #[error("no serial port pinned for the {role} node")]
    #[diagnostic(code(meshdeploy::role_not_pinned), help("Pass --port-primary and --port-secondary to pin each node to its serial port"))]
    RoleNotPinned { role: Role },
}

impl DeployError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            DeployError::CommandFailed(failure) => failure.exit_code(),
            _ => 1,
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag = match self {
            DeployError::CommandFailed(failure) => {
                let headline = match failure.code {
                    Some(code) => format!("command failed with exit code {}", code),
                    None => "command terminated by a signal".to_string(),
                };
                Diagnostic::error(headline)
                    .with_context(format!("command: {}", failure.command))
                    .with_detail("stdout", failure.stdout.as_str())
                    .with_detail("stderr", failure.stderr.as_str())
            }
            DeployError::ToolNotFound { hint, .. } => {
                Diagnostic::error(self.to_string()).with_suggestion(*hint)
            }
            DeployError::SdkNotFound { searched } => {
                let mut diag = Diagnostic::error(self.to_string());
                for path in searched {
                    diag = diag.with_context(format!("not found: {}", path.display()));
                }
                diag
            }
            DeployError::NoArtifacts { root } => {
                Diagnostic::error(self.to_string()).with_location(root.clone())
            }
            DeployError::WrapperNotFound { .. } | DeployError::RoleNotPinned { .. } => {
                Diagnostic::error(self.to_string())
            }
        };

        if let Some(help) = MietteDiagnostic::help(self) {
            diag = diag.with_suggestion(help.to_string());
        }
        diag
    }
}
