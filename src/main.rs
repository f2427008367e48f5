//! Paygate CLI entry point.

use anyhow::Context;
use clap::Parser;

use paygate::cli::{self, Cli, Commands};
use paygate::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => cli::handle_error(err, cli.json),
    };

    let _logger = match LogConfig::try_from(&config.logging)
        .context("Invalid logging configuration")
        .and_then(|log_config| LoggerImpl::init(&log_config))
    {
        Ok(logger) => logger,
        Err(err) => cli::handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Init(args) => cli::commands::init::execute(args, cli.json).await,
        Commands::Evaluate(args) => {
            cli::commands::evaluate::execute(args, &config, cli.json).await
        }
        Commands::Trial(args) => cli::commands::trial::execute(args, &config, cli.json).await,
        Commands::Offer(args) => cli::commands::offer::execute(args, &config, cli.json).await,
        Commands::Variant(args) => cli::commands::variant::execute(args, &config, cli.json),
        Commands::Outcome(args) => {
            cli::commands::outcome::execute(args, &config, cli.json).await
        }
    };

    if let Err(err) = result {
        cli::handle_error(err, cli.json);
    }
}
