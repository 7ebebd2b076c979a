//! The `neutron` command-line tool.
//!
//! A thin shell over [`neutron_db::Migrator`] plus file scaffolding for new
//! migrations and models. Configuration comes from a TOML file with
//! environment overrides (see [`config::load_config`]).

pub mod commands;
pub mod config;
pub mod scaffold;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "neutron", version, about = "Database migrations and scaffolding")]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, env = "NEUTRON_CONFIG_PATH")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the database migrations.
    Migrate {
        /// Override the configured database path.
        #[arg(long)]
        database: Option<String>,
    },

    /// Generate a new migration file and optionally a corresponding model.
    #[command(name = "generate:migration", alias = "generateMigration")]
    GenerateMigration {
        /// Name of the migration (e.g., create_messages_table).
        name: String,

        /// Also generate a model for the migration's table.
        #[arg(short, long)]
        model: bool,
    },
}

/// Installs the global tracing subscriber described by `logging`.
pub fn init_tracing(logging: &config::LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
