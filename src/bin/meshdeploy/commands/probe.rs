//! `meshdeploy probe` command

use std::sync::Arc;

use anyhow::Result;

use crate::cli::ProbeArgs;
use crate::commands::Session;
use meshdeploy::ops::{format_probe, probe, DeployOptions};
use meshdeploy::util::shell::Shell;

pub fn execute(args: ProbeArgs, shell: &Arc<Shell>) -> Result<()> {
    let session = Session::open(shell, args.project.root.as_deref())?;

    let mut opts = DeployOptions::from_config(&session.root, &session.config)?;
    args.targets.apply(&mut opts);

    let report = probe(&session.ctx, &opts);

    if shell.is_json() {
        shell.json_event(&serde_json::json!({
            "reason": "probe-report",
            "report": report,
        }));
    } else {
        print!("{}", format_probe(&report));
    }

    Ok(())
}
