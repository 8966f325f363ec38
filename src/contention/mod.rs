//! Serial port contention resolution.
//!
//! A serial monitor left running from a previous session keeps the port
//! open and makes the upload fail. Before each upload the holders are
//! asked to leave (SIGTERM), then forced (SIGKILL), then handed to
//! `fuser -k`. None of this is fatal: the upload decides whether the port
//! was really free.

pub mod holders;

use std::time::Duration;

use serde::Serialize;

use crate::core::SerialEndpoint;
use crate::util::context::DeployContext;
use crate::util::process::{self, Outcome, ProcessBuilder};
use crate::util::shell::Status;
use crate::util::system::{KillSignal, Pid};

pub use holders::{find_holders, parse_fuser_pids, parse_lsof_pids};

/// Wait after SIGTERM.
pub const TERM_GRACE: Duration = Duration::from_millis(500);
/// Wait after SIGKILL.
pub const KILL_GRACE: Duration = Duration::from_millis(500);
/// Wait after `fuser -k`.
pub const FUSER_GRACE: Duration = Duration::from_millis(300);

/// What happened to a port's holders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Reclaim {
    /// Nobody held the port.
    Free,
    /// These processes held the port and are gone.
    Reclaimed { pids: Vec<Pid> },
    /// These processes still hold the port.
    Residual { pids: Vec<Pid> },
}

impl Reclaim {
    pub fn is_clear(&self) -> bool {
        !matches!(self, Reclaim::Residual { .. })
    }
}

/// Free `port` from any process holding it.
pub fn reclaim(ctx: &DeployContext, port: &SerialEndpoint) -> Reclaim {
    let path = port.path();
    let holders = find_holders(ctx, path);
    if holders.is_empty() {
        tracing::debug!("{} is free", port);
        return Reclaim::Free;
    }

    ctx.shell.status(
        Status::Reclaiming,
        format!("{} from pid(s) {}", port, join_pids(&holders)),
    );

    signal_all(ctx, &holders, KillSignal::Terminate);
    ctx.system.sleep(TERM_GRACE);
    let mut remaining = find_holders(ctx, path);

    if !remaining.is_empty() {
        signal_all(ctx, &remaining, KillSignal::Kill);
        ctx.system.sleep(KILL_GRACE);
        remaining = find_holders(ctx, path);
    }

    if !remaining.is_empty() {
        if let Some(fuser) = ctx.system.find_executable(&ctx.tools.fuser) {
            let cmd = ProcessBuilder::new(fuser).arg("-k").arg(path);
            match process::run_tolerant(ctx.system(), &cmd) {
                Ok(Outcome::Succeeded(_)) => {}
                Ok(Outcome::FailedTolerated(f)) | Ok(Outcome::FailedFatal(f)) => {
                    tracing::debug!("{}", f)
                }
                Err(e) => tracing::debug!("`{}` failed: {:#}", cmd.display_command(), e),
            }
            ctx.system.sleep(FUSER_GRACE);
            remaining = find_holders(ctx, path);
        }
    }

    if remaining.is_empty() {
        Reclaim::Reclaimed { pids: holders }
    } else {
        ctx.shell.warn(format!(
            "{} is still held by pid(s) {}; the upload may fail",
            port,
            join_pids(&remaining)
        ));
        Reclaim::Residual { pids: remaining }
    }
}

fn signal_all(ctx: &DeployContext, pids: &[Pid], signal: KillSignal) {
    for &pid in pids {
        if let Err(e) = ctx.system.signal(pid, signal) {
            tracing::debug!("{:#}", e);
        }
    }
}

fn join_pids(pids: &[Pid]) -> String {
    pids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}
