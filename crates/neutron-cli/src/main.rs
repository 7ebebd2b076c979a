//! `neutron` binary entry point.

use std::process::ExitCode;

use clap::Parser;
use neutron_cli::{commands, config, init_tracing, Cli, Command};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref().unwrap_or("neutron.toml");

    let config = match config::load_config(Some(config_path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.logging);
    tracing::debug!(path = config_path, "resolved configuration path");

    let mut stdout = std::io::stdout().lock();
    let result = match &cli.command {
        Command::Migrate { database } => {
            commands::migrate(&config, database.as_deref(), &mut stdout)
                .map(|report| report.is_success())
        }
        Command::GenerateMigration { name, model } => {
            commands::generate_migration(&config, name, *model, &mut stdout).map(|()| true)
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
