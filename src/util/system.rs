//! The host seam: everything the deployer asks of the operating system.
//!
//! Stages never spawn processes, probe device nodes, send signals or sleep
//! directly; they go through a [`System`]. [`HostSystem`] is the real one.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use crate::util::process::{find_executable, ProcessBuilder, ProcessOutput};

/// A process id that was found holding a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Pid(u32);

impl Pid {
    pub fn new(raw: u32) -> Self {
        Pid(raw)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signals used to reclaim a serial port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillSignal {
    /// Graceful termination (SIGTERM).
    Terminate,
    /// Forceful kill (SIGKILL).
    Kill,
}

impl fmt::Display for KillSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KillSignal::Terminate => write!(f, "SIGTERM"),
            KillSignal::Kill => write!(f, "SIGKILL"),
        }
    }
}

/// Operating-system services used by the deployment stages.
pub trait System {
    /// Run a command to completion and capture its output.
    fn exec(&self, cmd: &ProcessBuilder) -> Result<ProcessOutput>;

    /// Locate a program on PATH.
    fn find_executable(&self, name: &str) -> Option<PathBuf>;

    /// Whether a filesystem path (device node, file) exists.
    fn exists(&self, path: &Path) -> bool;

    /// Deliver a signal to a process.
    fn signal(&self, pid: Pid, signal: KillSignal) -> Result<()>;

    /// Block the calling thread.
    fn sleep(&self, duration: Duration);
}

/// The real operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostSystem;

impl System for HostSystem {
    fn exec(&self, cmd: &ProcessBuilder) -> Result<ProcessOutput> {
        cmd.exec()
    }

    fn find_executable(&self, name: &str) -> Option<PathBuf> {
        let path = Path::new(name);
        if path.components().count() > 1 {
            return path.is_file().then(|| path.to_path_buf());
        }
        find_executable(name)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    #[cfg(unix)]
    fn signal(&self, pid: Pid, signal: KillSignal) -> Result<()> {
        use anyhow::Context;
        use nix::sys::signal::{kill, Signal};

        let raw = i32::try_from(pid.get()).with_context(|| format!("pid {} out of range", pid))?;
        let sig = match signal {
            KillSignal::Terminate => Signal::SIGTERM,
            KillSignal::Kill => Signal::SIGKILL,
        };
        kill(nix::unistd::Pid::from_raw(raw), sig)
            .with_context(|| format!("failed to send {} to pid {}", signal, pid))
    }

    #[cfg(not(unix))]
    fn signal(&self, pid: Pid, signal: KillSignal) -> Result<()> {
        anyhow::bail!("cannot send {} to pid {}: signals are only supported on Unix", signal, pid)
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
