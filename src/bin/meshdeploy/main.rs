//! meshdeploy CLI - deploy a two-node ESP32 mesh and its Android companion app

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use meshdeploy::util::diagnostic::{emit, suggestions};
use meshdeploy::util::shell::Shell;
use meshdeploy::DeployError;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let shell = Arc::new(cli.global.shell());
    let command = cli.command.unwrap_or(Commands::Deploy(cli.deploy));

    if let Err(err) = run(command, &shell) {
        let code = report_error(&shell, &err, cli.global.verbose);
        std::process::exit(code);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "meshdeploy=debug"
    } else {
        "meshdeploy=info"
    };
    let filter =
        EnvFilter::try_from_env("MESHDEPLOY_LOG").unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn run(command: Commands, shell: &Arc<Shell>) -> Result<()> {
    match command {
        Commands::Deploy(args) => commands::deploy::execute(args, shell),
        Commands::Probe(args) => commands::probe::execute(args, shell),
        Commands::Doctor(args) => commands::doctor::execute(args, shell),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}

/// Print `err` and return the process exit code for it.
fn report_error(shell: &Shell, err: &anyhow::Error, verbose: bool) -> i32 {
    let Some(deploy_err) = err.chain().find_map(|e| e.downcast_ref::<DeployError>()) else {
        shell.error(format!("{:#}", err));
        return 1;
    };
    let code = deploy_err.exit_code();

    if shell.is_json() {
        let failure = match deploy_err {
            DeployError::CommandFailed(failure) => serde_json::to_value(failure).ok(),
            _ => None,
        };
        shell.json_event(&serde_json::json!({
            "reason": "deploy-failed",
            "exit_code": code,
            "message": format!("{:#}", err),
            "failure": failure,
        }));
        return code;
    }

    let mut diag = deploy_err.to_diagnostic();
    for outer in err
        .chain()
        .take_while(|e| e.downcast_ref::<DeployError>().is_none())
    {
        diag = diag.with_context(outer.to_string());
    }
    if matches!(deploy_err, DeployError::CommandFailed(_)) && !verbose {
        diag = diag.with_suggestion(suggestions::RETRY_VERBOSE);
    }
    emit(&diag, shell.use_color());
    code
}
