//! testdeck CLI entry point.

mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), error::CliError> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(cli.log_level.as_str())
        .json()
        .init();

    match &cli.command {
        Commands::Check(_) => {
            commands::check::execute(&cli.config).await?;
        }
        Commands::Classify(args) => {
            commands::classify::execute(&args.identifier)?;
        }
        Commands::Watch(args) => {
            let addr = match &args.addr {
                Some(addr) => addr.clone(),
                None => commands::load_config(&cli.config).await?.hub.bind_addr,
            };
            commands::watch::execute(&addr).await?;
        }
        Commands::Run(args) => {
            let addr = match &args.addr {
                Some(addr) => addr.clone(),
                None => commands::load_config(&cli.config).await?.hub.bind_addr,
            };
            commands::run::execute(&addr, &args.args).await?;
        }
    }

    Ok(())
}
