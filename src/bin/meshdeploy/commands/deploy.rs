//! `meshdeploy deploy` command

use std::sync::Arc;

use anyhow::Result;

use crate::cli::DeployArgs;
use crate::commands::Session;
use meshdeploy::ops::{self, DeployOptions};
use meshdeploy::util::shell::Shell;

pub fn execute(args: DeployArgs, shell: &Arc<Shell>) -> Result<()> {
    let session = Session::open(shell, args.project.root.as_deref())?;

    let mut opts = DeployOptions::from_config(&session.root, &session.config)?;
    args.apply(&mut opts, session.config.apk_glob());

    let report = ops::deploy(&session.ctx, &opts)?;

    shell.json_event(&serde_json::json!({
        "reason": "deploy-finished",
        "success": true,
        "warnings": report.warnings(),
        "report": report,
    }));

    Ok(())
}
