//! Subcommand implementations. Output goes to the supplied writer so the
//! commands can run under test.

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use neutron_db::{Database, MigrationReport, Migrator};

use crate::config::Config;
use crate::scaffold;

/// Applies pending migrations and prints one line per migration.
///
/// `database` replaces the configured database path when given.
///
/// # Errors
///
/// Fails if the configuration names an unknown backend, the database
/// cannot be reached or the ledger cannot be read or written. A migration
/// whose SQL fails is reported in the returned [`MigrationReport`].
pub fn migrate(
    config: &Config,
    database: Option<&str>,
    out: &mut impl Write,
) -> anyhow::Result<MigrationReport> {
    let mut db_config = config.database.clone();
    if let Some(path) = database {
        db_config.path = path.to_string();
    }
    let settings = db_config
        .settings()
        .context("invalid database configuration")?;
    let db = Database::new(settings);

    let report = Migrator::new(&db, &config.migrations.directory)
        .run()
        .context("migration run aborted")?;

    for outcome in &report.outcomes {
        writeln!(out, "{outcome}")?;
    }
    if report.outcomes.is_empty() {
        writeln!(out, "Nothing to migrate.")?;
    }

    match report.failure() {
        Some(failed) => tracing::error!(migration = %failed.migration, "migrations halted"),
        None => tracing::info!(applied = report.applied().len(), "migrations complete"),
    }
    Ok(report)
}

/// Creates a migration stub and, with `with_model`, a model stub.
///
/// # Errors
///
/// Fails if the name is invalid or a file cannot be written. An existing
/// model file is reported as an error and left untouched.
pub fn generate_migration(
    config: &Config,
    name: &str,
    with_model: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let path = scaffold::create_migration(
        Path::new(&config.migrations.directory),
        name,
        Utc::now(),
    )?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    writeln!(out, "Migration created: {filename}")?;

    if with_model {
        let (_, model_path) =
            scaffold::create_model(Path::new(&config.migrations.models_directory), name)?;
        writeln!(out, "Model created: {}", model_path.display())?;
    }
    Ok(())
}
