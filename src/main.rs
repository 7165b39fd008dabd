//! eventcore CLI entry point.

use clap::Parser;

use eventcore::cli::{handle_error, load_config, Cli, Commands};
use eventcore::infrastructure::logging::LoggerImpl;

fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => handle_error(err, cli.json),
    };
    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Run(args) => eventcore::cli::commands::run::execute(args, &config, cli.json),
        Commands::Event(args) => eventcore::cli::commands::event::execute(args, &config, cli.json),
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
