//! The execution interface and the lazily connected [`Database`] handle.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use once_cell::unsync::OnceCell;

use crate::error::{DbError, Result};
use crate::sqlite::SqliteConnection;
use crate::value::{Row, Value};

/// Named parameters: placeholder name (without the leading `:`) and value.
pub type Params = [(String, Value)];

/// The three statement operations every backend provides.
///
/// Methods take `&self`; implementations are not expected to be shareable
/// across threads and callers serialize access themselves.
pub trait Connection {
    /// Which backend this connection talks to.
    fn backend(&self) -> Backend;

    /// Executes one statement and returns the number of affected rows.
    fn execute(&self, sql: &str, params: &Params) -> Result<usize>;

    /// Executes one statement and collects every result row.
    fn query(&self, sql: &str, params: &Params) -> Result<Vec<Row>>;

    /// Executes raw, possibly multi-statement SQL text verbatim.
    fn execute_batch(&self, sql: &str) -> Result<()>;

    /// Identifier assigned to the most recent successful insert.
    fn last_insert_id(&self) -> Result<i64>;
}

/// Supported backend dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// SQLite via `rusqlite`.
    Sqlite,
    /// MySQL. No driver ships in this workspace.
    Mysql,
    /// PostgreSQL. No driver ships in this workspace.
    Postgres,
}

impl Backend {
    /// Configuration name of the backend.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Mysql => "mysql",
            Self::Postgres => "pgsql",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "mysql" => Ok(Self::Mysql),
            "pgsql" | "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(DbError::Connection(format!(
                "unsupported database type: {other}"
            ))),
        }
    }
}

/// Everything needed to open a backend connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Which backend to open.
    pub backend: Backend,

    /// Database location. For SQLite this is a file path or `:memory:`.
    pub database: String,

    /// Busy timeout applied to the connection, in milliseconds.
    pub busy_timeout_ms: u64,
}

impl ConnectionSettings {
    /// SQLite settings for the given file path with the default timeout.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            backend: Backend::Sqlite,
            database: path.into(),
            busy_timeout_ms: 5_000,
        }
    }

    fn connect(&self) -> Result<Box<dyn Connection>> {
        match self.backend {
            Backend::Sqlite if self.database == ":memory:" => {
                Ok(Box::new(SqliteConnection::open_in_memory()?))
            }
            Backend::Sqlite => Ok(Box::new(SqliteConnection::open(
                PathBuf::from(&self.database),
                self.busy_timeout_ms,
            )?)),
            other => Err(DbError::Connection(format!(
                "backend '{other}' has no driver in this build"
            ))),
        }
    }
}

/// An owned, lazily connected database handle.
///
/// The first operation opens the backend described by the settings; the
/// connection is then reused until the handle is dropped. A failed connect
/// is reported to the caller and retried on the next operation.
pub struct Database {
    settings: Option<ConnectionSettings>,
    conn: OnceCell<Box<dyn Connection>>,
}

impl Database {
    /// Creates a handle that connects on first use.
    pub fn new(settings: ConnectionSettings) -> Self {
        Self {
            settings: Some(settings),
            conn: OnceCell::new(),
        }
    }

    /// Creates a handle with no backend. Every operation fails with
    /// [`DbError::Connection`].
    pub fn unconfigured() -> Self {
        Self {
            settings: None,
            conn: OnceCell::new(),
        }
    }

    /// Wraps an already open connection.
    pub fn from_connection(conn: impl Connection + 'static) -> Self {
        let cell = OnceCell::new();
        // The cell is fresh, so `set` cannot fail.
        let _ = cell.set(Box::new(conn) as Box<dyn Connection>);
        Self {
            settings: None,
            conn: cell,
        }
    }

    /// Opens a private in-memory SQLite database.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connection`] if SQLite cannot be initialised.
    pub fn in_memory() -> Result<Self> {
        Ok(Self::from_connection(SqliteConnection::open_in_memory()?))
    }

    /// Returns `true` once a backend connection has been established.
    pub fn is_connected(&self) -> bool {
        self.conn.get().is_some()
    }

    /// Returns the live connection, opening it if necessary.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connection`] if the handle is unconfigured or the
    /// backend cannot be opened.
    pub fn connection(&self) -> Result<&dyn Connection> {
        let conn = self.conn.get_or_try_init(|| {
            let settings = self.settings.as_ref().ok_or_else(|| {
                DbError::Connection("no database configured for this handle".to_string())
            })?;
            tracing::debug!(
                backend = %settings.backend,
                database = %settings.database,
                "opening database connection"
            );
            settings.connect()
        })?;
        Ok(conn.as_ref())
    }

    /// See [`Connection::execute`].
    pub fn execute(&self, sql: &str, params: &Params) -> Result<usize> {
        self.connection()?.execute(sql, params)
    }

    /// See [`Connection::query`].
    pub fn query(&self, sql: &str, params: &Params) -> Result<Vec<Row>> {
        self.connection()?.query(sql, params)
    }

    /// See [`Connection::execute_batch`].
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.connection()?.execute_batch(sql)
    }

    /// See [`Connection::last_insert_id`].
    pub fn last_insert_id(&self) -> Result<i64> {
        self.connection()?.last_insert_id()
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("settings", &self.settings)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_parse() {
        assert_eq!("sqlite".parse::<Backend>().unwrap(), Backend::Sqlite);
        assert_eq!("MySQL".parse::<Backend>().unwrap(), Backend::Mysql);
        assert_eq!("pgsql".parse::<Backend>().unwrap(), Backend::Postgres);
        assert_eq!("postgres".parse::<Backend>().unwrap(), Backend::Postgres);

        let err = "oracle".parse::<Backend>().expect_err("should reject");
        assert!(matches!(err, DbError::Connection(_)));
    }

    #[test]
    fn unconfigured_handle_fails_with_connection_error() {
        let db = Database::unconfigured();
        let err = db.query("SELECT 1", &[]).expect_err("should fail");
        assert!(matches!(err, DbError::Connection(_)), "{err:?}");
        assert!(!db.is_connected());
    }

    #[test]
    fn handle_connects_lazily_and_reuses_connection() {
        let db = Database::new(ConnectionSettings::sqlite(":memory:"));
        assert!(!db.is_connected(), "must not connect before first use");

        db.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT);")
            .expect("create should succeed");
        assert!(db.is_connected());

        // Same in-memory database, so the table is still there.
        db.execute(
            "INSERT INTO t (v) VALUES (:v)",
            &[("v".to_string(), Value::from("x"))],
        )
        .expect("insert should reuse the connection");
        assert_eq!(db.last_insert_id().unwrap(), 1);
    }

    #[test]
    fn drivers_without_implementation_are_connection_errors() {
        let db = Database::new(ConnectionSettings {
            backend: Backend::Postgres,
            database: "neutron".to_string(),
            busy_timeout_ms: 0,
        });
        let err = db.execute("SELECT 1", &[]).expect_err("no postgres driver");
        assert!(matches!(err, DbError::Connection(_)));
    }
}
