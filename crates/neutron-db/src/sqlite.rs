//! SQLite backend built on `rusqlite`.

use std::path::Path;
use std::time::Duration;

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::OpenFlags;

use crate::connection::{Backend, Connection, Params};
use crate::error::{DbError, Result};
use crate::value::{Row, Value};

/// A single SQLite connection.
#[derive(Debug)]
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    /// Opens (creating if needed) the SQLite database file at `path`.
    ///
    /// The parent directory is created when missing. WAL journaling and
    /// foreign keys are enabled, and `busy_timeout_ms` is applied.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connection`] if the directory cannot be created,
    /// the file cannot be opened or a pragma is rejected.
    pub fn open(path: impl AsRef<Path>, busy_timeout_ms: u64) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                DbError::Connection(format!(
                    "failed to create database directory {}: {e}",
                    dir.display()
                ))
            })?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = rusqlite::Connection::open_with_flags(path, flags).map_err(|e| {
            DbError::Connection(format!(
                "failed to open database {}: {e}",
                path.display()
            ))
        })?;

        // In-memory and some special files report "memory" instead of "wal".
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))
            .map_err(|e| DbError::Connection(format!("failed to set journal mode: {e}")))?;
        if journal_mode != "wal" && journal_mode != "memory" {
            return Err(DbError::Connection(format!(
                "failed to set WAL journal mode, got: {journal_mode}"
            )));
        }

        conn.busy_timeout(Duration::from_millis(busy_timeout_ms))
            .map_err(|e| DbError::Connection(format!("failed to set busy timeout: {e}")))?;

        Self::configure(conn)
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connection`] if SQLite cannot be initialised.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory().map_err(|e| {
            DbError::Connection(format!("failed to open in-memory database: {e}"))
        })?;
        Self::configure(conn)
    }

    fn configure(conn: rusqlite::Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| DbError::Connection(format!("failed to set pragmas: {e}")))?;
        Ok(Self { conn })
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Integer(v) => ToSqlOutput::from(*v),
            Value::Real(v) => ToSqlOutput::from(*v),
            Value::Text(v) => ToSqlOutput::from(v.as_str()),
            Value::Blob(v) => ToSqlOutput::from(v.as_slice()),
        })
    }
}

fn value_from_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Real(v),
        ValueRef::Text(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => Value::Blob(v.to_vec()),
    }
}

/// Prefixes each parameter name with `:` as SQLite expects.
fn placeholder_names(params: &Params) -> Vec<String> {
    params.iter().map(|(name, _)| format!(":{name}")).collect()
}

fn bind<'a>(names: &'a [String], params: &'a Params) -> Vec<(&'a str, &'a dyn ToSql)> {
    names
        .iter()
        .zip(params)
        .map(|(name, (_, value))| (name.as_str(), value as &dyn ToSql))
        .collect()
}

impl Connection for SqliteConnection {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn execute(&self, sql: &str, params: &Params) -> Result<usize> {
        let names = placeholder_names(params);
        let bound = bind(&names, params);
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| DbError::execution(sql, e))?;
        stmt.execute(bound.as_slice())
            .map_err(|e| DbError::execution(sql, e))
    }

    fn query(&self, sql: &str, params: &Params) -> Result<Vec<Row>> {
        let names = placeholder_names(params);
        let bound = bind(&names, params);
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| DbError::execution(sql, e))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt
            .query(bound.as_slice())
            .map_err(|e| DbError::execution(sql, e))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| DbError::execution(sql, e))? {
            let mut values = Vec::with_capacity(columns.len());
            for (idx, name) in columns.iter().enumerate() {
                let value = row.get_ref(idx).map_err(|e| DbError::execution(sql, e))?;
                values.push((name.clone(), value_from_ref(value)));
            }
            out.push(Row::new(values));
        }
        Ok(out)
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| DbError::execution("batch", e))
    }

    fn last_insert_id(&self) -> Result<i64> {
        Ok(self.conn.last_insert_rowid())
    }
}
