//! `meshdeploy doctor` command

use std::sync::Arc;

use anyhow::Result;

use crate::cli::DoctorArgs;
use crate::commands::Session;
use meshdeploy::ops::{doctor, format_report, DoctorOptions};
use meshdeploy::util::shell::Shell;

pub fn execute(args: DoctorArgs, shell: &Arc<Shell>) -> Result<()> {
    let session = Session::open(shell, args.project.root.as_deref())?;

    let options = DoctorOptions {
        mobile_dir: session.root.join(session.config.mobile_dir()),
        sdk: args.sdk.or_else(|| session.config.mobile.sdk.clone()),
    };

    let report = doctor(&session.ctx, &options);

    if shell.is_json() {
        shell.json_event(&serde_json::json!({
            "reason": "doctor-report",
            "ok": report.all_required_passed(),
            "report": report,
        }));
    } else {
        print!("{}", format_report(&report, shell.is_verbose()));
    }

    // Exit with error code if required checks failed
    if !report.all_required_passed() {
        std::process::exit(1);
    }

    Ok(())
}
