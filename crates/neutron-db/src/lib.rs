//! Database layer for Neutron.
//!
//! Provides the single execution interface shared by the model layer and
//! the migration runner, the SQLite backend behind it, and the file-based
//! migration runner that applies each schema change exactly once.
//!
//! # Design decisions
//!
//! - **Explicit connection handle**: a [`Database`] is created by the caller
//!   and passed by reference to everything that talks to the backend. It
//!   connects lazily on first use and keeps that one connection for its
//!   whole lifetime. There is no pool and no reconnect.
//! - **Named parameters only**: values always travel as bound parameters.
//!   Identifiers (tables, columns) are validated with [`validate_identifier`]
//!   and double-quoted with [`quote_identifier`] before they are
//!   interpolated into SQL text.
//! - **File-based migrations**: migration files are discovered at runtime
//!   from a directory, ordered by the timestamp in their filename and
//!   tracked in a `migrations` ledger table.

mod connection;
mod error;
mod identifier;
mod migrations;
mod sqlite;
mod value;

pub use connection::{Backend, Connection, ConnectionSettings, Database, Params};
pub use error::{BackendError, DbError, Result};
pub use identifier::{quote_identifier, validate_identifier};
pub use migrations::{
    MigrationError, MigrationOutcome, MigrationRecord, MigrationReport, MigrationSource,
    MigrationStatus, Migrator, DEFAULT_LEDGER_TABLE,
};
pub use sqlite::SqliteConnection;
pub use value::{FromValue, Row, Value};
