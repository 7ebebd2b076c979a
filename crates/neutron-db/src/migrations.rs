//! File-based SQL migration runner.
//!
//! Migrations are `.sql` files named `<unix_ts>_<name>.sql` in a single
//! directory. They run in ascending timestamp order and each one is
//! recorded in the `migrations` ledger table after its SQL succeeds. A
//! migration that is already in the ledger is skipped, so every migration
//! runs exactly once. The first failure stops the run.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::connection::Database;
use crate::error::DbError;
use crate::identifier::{quote_identifier, validate_identifier};

/// Name of the ledger table unless overridden.
pub const DEFAULT_LEDGER_TABLE: &str = "migrations";

/// One migration file: its filename and raw SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSource {
    filename: String,
    timestamp: u64,
    label: String,
    sql: String,
}

impl MigrationSource {
    /// Builds a source from a `<digits>_<name>.sql` filename and its SQL.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Validation`] if the filename does not follow the
    /// pattern.
    pub fn parse(filename: impl Into<String>, sql: impl Into<String>) -> Result<Self, DbError> {
        let filename = filename.into();
        let invalid = |reason: &str| {
            DbError::Validation(format!("invalid migration filename '{filename}': {reason}"))
        };

        let stem = filename
            .strip_suffix(".sql")
            .ok_or_else(|| invalid("missing .sql extension"))?;
        let (ts, label) = stem
            .split_once('_')
            .ok_or_else(|| invalid("expected <timestamp>_<name>.sql"))?;
        if ts.is_empty() || !ts.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("timestamp prefix must be digits"));
        }
        if label.is_empty() {
            return Err(invalid("name must not be empty"));
        }
        let timestamp = ts
            .parse::<u64>()
            .map_err(|_| invalid("timestamp out of range"))?;

        Ok(Self {
            timestamp,
            label: label.to_string(),
            sql: sql.into(),
            filename,
        })
    }

    /// The filename, which is also the ledger identifier.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Creation timestamp encoded in the filename.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Human name encoded in the filename.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Raw SQL text, executed verbatim.
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// A row of the ledger table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    /// Ledger row ID.
    pub id: i64,
    /// Migration filename.
    pub migration: String,
    /// When the migration was recorded, as stored by the backend.
    pub created_at: String,
}

/// Final state of one migration within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationStatus {
    /// Already in the ledger; nothing was executed.
    Skipped,
    /// Executed and recorded.
    Applied,
    /// Rejected by the backend, or executed without its ledger row being
    /// written. Not recorded either way.
    Failed {
        /// Backend error message.
        message: String,
    },
}

/// Outcome of a single migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOutcome {
    /// Migration filename.
    pub migration: String,
    /// What happened to it.
    pub status: MigrationStatus,
}

impl fmt::Display for MigrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            MigrationStatus::Skipped => write!(f, "Skipped: {}", self.migration),
            MigrationStatus::Applied => write!(f, "Executed migration: {}", self.migration),
            MigrationStatus::Failed { message } => write!(
                f,
                "Error executing migration: {}: {message}",
                self.migration
            ),
        }
    }
}

/// Everything a run did, in execution order.
///
/// Migrations after a failure never appear.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// One entry per migration that was considered.
    pub outcomes: Vec<MigrationOutcome>,
}

impl MigrationReport {
    /// Filenames applied during this run.
    pub fn applied(&self) -> Vec<&str> {
        self.with_status(|s| matches!(s, MigrationStatus::Applied))
    }

    /// Filenames skipped because they were already recorded.
    pub fn skipped(&self) -> Vec<&str> {
        self.with_status(|s| matches!(s, MigrationStatus::Skipped))
    }

    /// The migration that stopped the run, if any.
    pub fn failure(&self) -> Option<&MigrationOutcome> {
        self.outcomes
            .iter()
            .find(|o| matches!(o.status, MigrationStatus::Failed { .. }))
    }

    /// Returns `true` if no migration failed.
    pub fn is_success(&self) -> bool {
        self.failure().is_none()
    }

    fn with_status(&self, pred: impl Fn(&MigrationStatus) -> bool) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| pred(&o.status))
            .map(|o| o.migration.as_str())
            .collect()
    }
}

/// Errors that stop the runner outside of a migration's own SQL.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The database handle could not connect.
    #[error("migration runner could not connect: {0}")]
    Connection(DbError),

    /// Reading or writing the ledger table failed.
    #[error("migration ledger {operation} failed: {source}")]
    Ledger {
        /// What the runner was doing with the ledger.
        operation: String,
        /// The underlying database error.
        source: DbError,
    },

    /// The migration directory or a file in it could not be read.
    #[error("failed to read migrations from {}: {source}", .path.display())]
    Discovery {
        /// Directory or file that failed.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

fn ledger_error(operation: impl Into<String>) -> impl FnOnce(DbError) -> MigrationError {
    let operation = operation.into();
    move |e| match e {
        DbError::Connection(_) => MigrationError::Connection(e),
        source => MigrationError::Ledger { operation, source },
    }
}

fn backend_message(e: &DbError) -> String {
    match e {
        DbError::Execution { source, .. } => source.to_string(),
        other => other.to_string(),
    }
}

/// Applies pending migrations from one directory against one database.
#[derive(Debug)]
pub struct Migrator<'a> {
    db: &'a Database,
    directory: PathBuf,
    ledger: String,
}

impl<'a> Migrator<'a> {
    /// Creates a runner over `directory` using the default ledger table.
    pub fn new(db: &'a Database, directory: impl Into<PathBuf>) -> Self {
        Self {
            db,
            directory: directory.into(),
            ledger: DEFAULT_LEDGER_TABLE.to_string(),
        }
    }

    /// Uses `table` as the ledger instead of `migrations`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Validation`] if `table` is not a safe identifier.
    pub fn with_ledger_table(mut self, table: &str) -> Result<Self, DbError> {
        validate_identifier(table)?;
        self.ledger = table.to_string();
        Ok(self)
    }

    /// Directory this runner discovers migrations in.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Creates the ledger table if it does not exist. Safe to call on
    /// every run.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Connection`] if the database cannot be
    /// reached, or [`MigrationError::Ledger`] if the statement fails.
    pub fn ensure_ledger(&self) -> Result<(), MigrationError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                migration TEXT NOT NULL UNIQUE,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );",
            quote_identifier(&self.ledger)
        );
        self.db
            .execute_batch(&sql)
            .map_err(ledger_error("bootstrap"))
    }

    /// Identifiers currently recorded in the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError`] if the ledger cannot be read.
    pub fn list_applied(&self) -> Result<BTreeSet<String>, MigrationError> {
        Ok(self
            .applied_records()?
            .into_iter()
            .map(|record| record.migration)
            .collect())
    }

    /// Full ledger rows in the order they were recorded.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError`] if the ledger cannot be read or a row has
    /// an unexpected shape.
    pub fn applied_records(&self) -> Result<Vec<MigrationRecord>, MigrationError> {
        let sql = format!(
            "SELECT id, migration, created_at FROM {} ORDER BY id",
            quote_identifier(&self.ledger)
        );
        let rows = self.db.query(&sql, &[]).map_err(ledger_error("read"))?;
        rows.iter()
            .map(|row| -> Result<MigrationRecord, DbError> {
                Ok(MigrationRecord {
                    id: row.try_get("id")?,
                    migration: row.try_get("migration")?,
                    created_at: row
                        .try_get::<Option<String>>("created_at")?
                        .unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>, DbError>>()
            .map_err(ledger_error("read"))
    }

    /// Lists migration files in the directory, sorted by timestamp.
    ///
    /// Files without a `.sql` extension or whose name does not match
    /// `<timestamp>_<name>.sql` are skipped with a warning. A missing
    /// directory yields no migrations.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Discovery`] if the directory or a file in
    /// it cannot be read.
    pub fn discover(&self) -> Result<Vec<MigrationSource>, MigrationError> {
        let discovery = |path: &Path| {
            let path = path.to_path_buf();
            move |source| MigrationError::Discovery { path, source }
        };

        let entries = match std::fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    directory = %self.directory.display(),
                    "migration directory not found, nothing to run"
                );
                return Ok(Vec::new());
            }
            Err(e) => return Err(discovery(&self.directory)(e)),
        };

        let mut sources = Vec::new();
        for entry in entries {
            let entry = entry.map_err(discovery(&self.directory))?;
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("sql") {
                continue;
            }
            let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                tracing::warn!(path = %path.display(), "skipping migration with non UTF-8 name");
                continue;
            };
            let sql = std::fs::read_to_string(&path).map_err(discovery(&path))?;
            match MigrationSource::parse(filename, sql) {
                Ok(source) => sources.push(source),
                Err(e) => tracing::warn!(file = filename, error = %e, "skipping migration file"),
            }
        }

        sort_sources(&mut sources);
        Ok(sources)
    }

    /// Discovers and applies every pending migration.
    ///
    /// # Errors
    ///
    /// See [`Migrator::discover`] and [`Migrator::run_sources`].
    pub fn run(&self) -> Result<MigrationReport, MigrationError> {
        let sources = self.discover()?;
        self.run_sources(sources)
    }

    /// Applies pending migrations from an explicit list.
    ///
    /// The list is sorted by timestamp first. A migration whose SQL the
    /// backend rejects, or whose ledger row cannot be written, is reported
    /// as [`MigrationStatus::Failed`] and ends the run; later migrations are
    /// not attempted. Outcomes gathered before the failure are kept.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError`] if the ledger cannot be created or read
    /// before the first migration runs.
    pub fn run_sources(
        &self,
        mut sources: Vec<MigrationSource>,
    ) -> Result<MigrationReport, MigrationError> {
        sort_sources(&mut sources);
        self.ensure_ledger()?;
        let mut applied = self.list_applied()?;
        let mut report = MigrationReport::default();

        for source in sources {
            let name = source.filename().to_string();

            if applied.contains(&name) {
                tracing::debug!(migration = %name, "migration already applied, skipping");
                report.outcomes.push(MigrationOutcome {
                    migration: name,
                    status: MigrationStatus::Skipped,
                });
                continue;
            }

            tracing::info!(migration = %name, "applying migration");

            if let Err(e) = self.db.execute_batch(source.sql()) {
                let message = backend_message(&e);
                tracing::error!(migration = %name, error = %message, "migration failed");
                report.outcomes.push(MigrationOutcome {
                    migration: name,
                    status: MigrationStatus::Failed { message },
                });
                break;
            }

            let insert = format!(
                "INSERT INTO {} (migration) VALUES (:migration)",
                quote_identifier(&self.ledger)
            );
            if let Err(e) = self
                .db
                .execute(&insert, &[("migration".to_string(), name.as_str().into())])
            {
                let message = format!(
                    "executed but not recorded in {}: {}",
                    self.ledger,
                    backend_message(&e)
                );
                tracing::error!(migration = %name, error = %message, "migration ledger write failed");
                report.outcomes.push(MigrationOutcome {
                    migration: name,
                    status: MigrationStatus::Failed { message },
                });
                break;
            }

            applied.insert(name.clone());
            report.outcomes.push(MigrationOutcome {
                migration: name,
                status: MigrationStatus::Applied,
            });
        }

        Ok(report)
    }
}

fn sort_sources(sources: &mut [MigrationSource]) {
    sources.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.filename.cmp(&b.filename))
    });
}
