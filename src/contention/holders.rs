//! Finding the processes that hold a serial port open.

use std::path::Path;

use crate::util::context::DeployContext;
use crate::util::process::{self, Outcome, ProcessBuilder};
use crate::util::system::Pid;

/// Parse `lsof -t` output: one pid per line.
pub fn parse_lsof_pids(output: &str) -> Vec<Pid> {
    let mut pids: Vec<Pid> = output
        .lines()
        .filter_map(|l| l.trim().parse::<u32>().ok())
        .filter(|&raw| raw != 0)
        .map(Pid::new)
        .collect();
    pids.sort();
    pids.dedup();
    pids
}

/// Parse `fuser PATH` output.
///
/// psmisc prints pids with access-type suffixes (`1234c`, `5678m`) and some
/// builds echo the path with a trailing colon on stdout, so the path token
/// is skipped and every other token is reduced to its digits.
pub fn parse_fuser_pids(output: &str) -> Vec<Pid> {
    let mut pids: Vec<Pid> = output
        .split_whitespace()
        .filter(|t| !t.contains('/') && !t.ends_with(':'))
        .filter_map(|t| {
            let digits: String = t.chars().filter(char::is_ascii_digit).collect();
            digits.parse::<u32>().ok()
        })
        .filter(|&raw| raw != 0)
        .map(Pid::new)
        .collect();
    pids.sort();
    pids.dedup();
    pids
}

/// Processes currently holding `path`, excluding this one.
///
/// Asks lsof first and falls back to fuser when lsof is missing or reports
/// nothing. Any probe failure counts as "no holders".
pub fn find_holders(ctx: &DeployContext, path: &Path) -> Vec<Pid> {
    let mut pids = query_lsof(ctx, path);
    if pids.is_empty() {
        pids = query_fuser(ctx, path);
    }

    let own = Pid::new(std::process::id());
    pids.retain(|p| *p != own);
    pids
}

fn query_lsof(ctx: &DeployContext, path: &Path) -> Vec<Pid> {
    let Some(lsof) = ctx.system.find_executable(&ctx.tools.lsof) else {
        return Vec::new();
    };
    let cmd = ProcessBuilder::new(lsof).args(["-t", "--"]).arg(path);
    query(ctx, &cmd, parse_lsof_pids)
}

fn query_fuser(ctx: &DeployContext, path: &Path) -> Vec<Pid> {
    let Some(fuser) = ctx.system.find_executable(&ctx.tools.fuser) else {
        return Vec::new();
    };
    let cmd = ProcessBuilder::new(fuser).arg(path);
    query(ctx, &cmd, parse_fuser_pids)
}

fn query(ctx: &DeployContext, cmd: &ProcessBuilder, parse: fn(&str) -> Vec<Pid>) -> Vec<Pid> {
    match process::run_tolerant(ctx.system(), cmd) {
        Ok(Outcome::Succeeded(output)) => parse(&output.stdout),
        // Both tools exit 1 when nobody holds the file.
        Ok(_) => Vec::new(),
        Err(e) => {
            tracing::debug!("`{}` failed: {:#}", cmd.display_command(), e);
            Vec::new()
        }
    }
}
