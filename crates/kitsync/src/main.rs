mod cli;
mod commands;
mod interactive;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
use commands::GlobalOptions;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("KITSYNC_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    ctrlc::set_handler(|| {
        eprintln!("\n\nInterrupted by user (Ctrl+C)");
        std::process::exit(130); // Standard exit code for SIGINT
    })
    .context("Failed to set Ctrl+C handler")?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let options = GlobalOptions::from_cli(&cli);

    let success = match &cli.command {
        Commands::Plan { sync } => commands::Plan::execute(sync, &options)
            .await
            .context("Failed to execute plan command")?,
        Commands::Apply { sync, force } => commands::Apply::execute(sync, *force, &options)
            .await
            .context("Failed to execute apply command")?,
        Commands::Diff { sync } => commands::Diff::execute(sync, &options)
            .await
            .context("Failed to execute diff command")?,
        Commands::Status { target } => commands::Status::execute(target, &options)
            .context("Failed to execute status command")?,
        Commands::Config => {
            commands::Config::execute(&options).context("Failed to execute config command")?
        }
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
