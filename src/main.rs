use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::debug;

use basement::cli::Cli;
use basement::core::{BorgCli, DockerEngine, Escalation, Pipeline};
use basement::utils::{console, logging, Settings};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Reported here only, so the failure is printed once
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            console::failure(&console::failure_message(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    // Replayed verbatim inside the child container
    let command_line: Vec<String> = std::env::args().skip(1).collect();

    let cli = Cli::parse();
    logging::init(cli.verbose);

    let settings = Settings::load().context("Failed to load configuration")?;
    debug!(?settings, "configuration loaded");

    let engine = DockerEngine::connect()?;
    if !engine.check_docker().await {
        bail!("Docker daemon is not responding. Is the control socket mounted?");
    }

    let archiver = BorgCli::new(&settings.archiver);
    let escalation = Escalation::from_env();
    debug!(child = escalation.is_child, self_ref = ?escalation.self_ref, "starting");

    let operation = cli.command.into_operation();
    let pipeline = Pipeline::new(&engine, &archiver, &settings, escalation);

    pipeline.run(&operation, command_line).await?;
    Ok(())
}
