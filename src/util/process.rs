//! Subprocess execution utilities.
//!
//! Every external tool the deployer drives (PlatformIO, Gradle, adb, lsof,
//! fuser) goes through [`ProcessBuilder`]. Commands run to completion with
//! captured output; there is no retry and no timeout.
//!
//! Failure handling is explicit: a call site picks a [`FailurePolicy`] up
//! front and receives an [`Outcome`]. A fatal outcome can only be consumed
//! by turning it into an error with [`Outcome::escalate`].

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::error::DeployError;
use crate::util::system::System;

/// Builder for subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: Vec<(String, String)>,
    cwd: Option<PathBuf>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable on the child process only.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<OsStr>) -> Self {
        self.env.push((
            key.as_ref().to_string(),
            value.as_ref().to_string_lossy().into_owned(),
        ));
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Get the program path.
    pub fn get_program(&self) -> &Path {
        &self.program
    }

    /// Get the arguments.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Get the child-only environment overrides.
    pub fn get_envs(&self) -> &[(String, String)] {
        &self.env
    }

    /// Get the working directory, if one was set.
    pub fn get_cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd
    }

    /// Spawn the command, wait for it and capture both streams.
    ///
    /// Only spawn/wait failures are errors here; a non-zero exit is reported
    /// through [`ProcessOutput::code`].
    pub fn exec(&self) -> Result<ProcessOutput> {
        let mut cmd = self.build_command();
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", self.program.display()))?;

        let output = child
            .wait_with_output()
            .with_context(|| format!("failed to wait for `{}`", self.program.display()))?;

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Display the command for error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().map(|a| quote_arg(a)));
        parts.join(" ")
    }
}

fn quote_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains(|c: char| c.is_whitespace() || c == '\'' || c == '"') {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// Whether the process exited with status 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A command that exited unsuccessfully, with everything it printed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandFailure {
    pub command: String,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandFailure {
    fn new(cmd: &ProcessBuilder, output: ProcessOutput) -> Self {
        CommandFailure {
            command: cmd.display_command(),
            code: output.code,
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }

    /// Process exit code for this failure; signal deaths map to 1.
    pub fn exit_code(&self) -> i32 {
        match self.code {
            Some(code) if code != 0 => code,
            _ => 1,
        }
    }

    /// First non-empty line of stderr (or stdout), for one-line warnings.
    pub fn summary(&self) -> String {
        self.stderr
            .lines()
            .chain(self.stdout.lines())
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("no output")
            .to_string()
    }
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "`{}` exited with code {}", self.command, code),
            None => write!(f, "`{}` was terminated by a signal", self.command),
        }
    }
}

/// What a call site wants done when a command exits non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// The failure aborts the run.
    Abort,
    /// The failure is reported back and the caller carries on.
    Tolerate,
}

/// Result of running a command under a [`FailurePolicy`].
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded(ProcessOutput),
    FailedTolerated(CommandFailure),
    FailedFatal(CommandFailure),
}

impl Outcome {
    /// Classify a finished process under the given policy.
    pub fn classify(cmd: &ProcessBuilder, output: ProcessOutput, policy: FailurePolicy) -> Self {
        if output.success() {
            return Outcome::Succeeded(output);
        }
        let failure = CommandFailure::new(cmd, output);
        match policy {
            FailurePolicy::Abort => Outcome::FailedFatal(failure),
            FailurePolicy::Tolerate => Outcome::FailedTolerated(failure),
        }
    }

    /// Turn a fatal failure into [`DeployError::CommandFailed`].
    pub fn escalate(self) -> Result<Self, DeployError> {
        match self {
            Outcome::FailedFatal(failure) => Err(DeployError::CommandFailed(Box::new(failure))),
            other => Ok(other),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded(_))
    }
}

/// Run a command under `policy` through the given system.
pub fn run(system: &dyn System, cmd: &ProcessBuilder, policy: FailurePolicy) -> Result<Outcome> {
    tracing::debug!("running `{}`", cmd.display_command());
    let output = system.exec(cmd)?;
    Ok(Outcome::classify(cmd, output, policy))
}

/// Run a command that must succeed.
pub fn run_checked(system: &dyn System, cmd: &ProcessBuilder) -> Result<ProcessOutput> {
    match run(system, cmd, FailurePolicy::Abort)?.escalate()? {
        Outcome::Succeeded(output) => Ok(output),
        // Abort never yields a tolerated failure; treat one as fatal anyway.
        Outcome::FailedTolerated(failure) | Outcome::FailedFatal(failure) => {
            Err(DeployError::CommandFailed(Box::new(failure)).into())
        }
    }
}

/// Run a command whose failure the caller will inspect.
pub fn run_tolerant(system: &dyn System, cmd: &ProcessBuilder) -> Result<Outcome> {
    run(system, cmd, FailurePolicy::Tolerate)
}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}
