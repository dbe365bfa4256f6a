//! regflow - Main Entry Point
//!
//! Runs the regression training workflow from the command line.

use clap::Parser;
use regression_workflow::cli::{cmd_clean, cmd_evaluate, cmd_train, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "regression_workflow=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train(args) => {
            cmd_train(&args)?;
        }
        Commands::Clean { data, output, config, preset, target } => {
            cmd_clean(&data, &output, config.as_deref(), preset, target.as_deref())?;
        }
        Commands::Evaluate { model, data, target, cleaning } => {
            cmd_evaluate(&model, &data, &target, cleaning.as_deref())?;
        }
    }

    Ok(())
}
