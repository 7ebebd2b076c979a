//! Migration and model file generation.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Words that describe the change rather than the table.
const ACTION_KEYWORDS: &[&str] = &["create", "delete", "add", "update", "column", "to", "table"];

const MODEL_TEMPLATE: &str = r#"use neutron_db::{Result, Row, Value};
use neutron_model::Model;

/// A row of the `__TABLE__` table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct __MODEL__ {
    pub id: Option<i64>,
}

impl Model for __MODEL__ {
    const TABLE: &'static str = "__TABLE__";

    fn primary_key(&self) -> Option<i64> {
        self.id
    }

    fn set_primary_key(&mut self, key: Option<i64>) {
        self.id = key;
    }

    fn fields(&self) -> Vec<(&'static str, Value)> {
        Vec::new()
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
        })
    }
}
"#;

/// Errors raised while generating files.
#[derive(Debug, Error)]
pub enum ScaffoldError {
    /// The migration name is not snake_case.
    #[error("invalid migration name '{0}': use lowercase letters, digits and underscores")]
    InvalidName(String),

    /// The target file is already there.
    #[error("{} already exists", .0.display())]
    AlreadyExists(PathBuf),

    /// Writing the file or its directory failed.
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        /// File or directory being written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ScaffoldError {
    let path = path.to_path_buf();
    move |source| ScaffoldError::Io { path, source }
}

fn validate_name(name: &str) -> Result<(), ScaffoldError> {
    let valid = !name.is_empty()
        && !name.starts_with('_')
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(ScaffoldError::InvalidName(name.to_string()))
    }
}

/// Writes an empty `<unix_ts>_<name>.sql` migration into `dir`, creating the
/// directory when missing. Returns the new file's path.
///
/// # Errors
///
/// Returns [`ScaffoldError`] for a bad name, an existing file or an I/O
/// failure.
pub fn create_migration(
    dir: &Path,
    name: &str,
    now: DateTime<Utc>,
) -> Result<PathBuf, ScaffoldError> {
    validate_name(name)?;
    std::fs::create_dir_all(dir).map_err(io_error(dir))?;

    let path = dir.join(format!("{}_{name}.sql", now.timestamp()));
    if path.exists() {
        return Err(ScaffoldError::AlreadyExists(path));
    }

    let stub = format!(
        "-- Migration: {name}\n-- Generated at: {}\n\n",
        now.format("%Y-%m-%d %H:%M:%S")
    );
    std::fs::write(&path, stub).map_err(io_error(&path))?;
    tracing::info!(path = %path.display(), "migration created");
    Ok(path)
}

/// Writes a model stub derived from `migration_name` into `dir`. Returns
/// the model name and the file's path.
///
/// # Errors
///
/// Returns [`ScaffoldError::AlreadyExists`] rather than overwriting an
/// existing model, or [`ScaffoldError::Io`] on write failure.
pub fn create_model(dir: &Path, migration_name: &str) -> Result<(String, PathBuf), ScaffoldError> {
    validate_name(migration_name)?;
    let (model, table) = model_names(migration_name);

    std::fs::create_dir_all(dir).map_err(io_error(dir))?;
    let path = dir.join(format!("{}.rs", to_snake_case(&model)));
    if path.exists() {
        return Err(ScaffoldError::AlreadyExists(path));
    }

    let source = MODEL_TEMPLATE
        .replace("__MODEL__", &model)
        .replace("__TABLE__", &table);
    std::fs::write(&path, source).map_err(io_error(&path))?;
    tracing::info!(model = %model, path = %path.display(), "model created");
    Ok((model, path))
}

/// Derives `(ModelName, table_name)` from a migration name.
///
/// `create_messages_table` gives `("Message", "messages")` and
/// `add_status_to_orders_table` gives `("Order", "orders")`. Without a
/// trailing `table`, the action keywords are dropped and the rest is used.
/// As a last resort the result is `("Model", "models")`.
pub fn model_names(migration_name: &str) -> (String, String) {
    let parts: Vec<&str> = migration_name.split('_').filter(|p| !p.is_empty()).collect();

    if let Some(table_idx) = parts.iter().position(|p| *p == "table").filter(|i| *i > 0) {
        let before = &parts[..table_idx];
        let start = match before.iter().rposition(|p| *p == "to") {
            Some(to_idx) => to_idx + 1,
            None => usize::from(ACTION_KEYWORDS.contains(&before[0])),
        };
        let table_parts = &before[start..];
        if !table_parts.is_empty() {
            return names_from_parts(table_parts);
        }
    }

    let core: Vec<&str> = parts
        .iter()
        .copied()
        .filter(|p| !ACTION_KEYWORDS.contains(p))
        .collect();
    if core.is_empty() {
        return ("Model".to_string(), "models".to_string());
    }
    names_from_parts(&core)
}

fn names_from_parts(parts: &[&str]) -> (String, String) {
    let table = parts.join("_").to_ascii_lowercase();
    let mut words: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
    if let Some(last) = words.last_mut() {
        *last = singularize(last);
    }
    let model = words.iter().map(|w| capitalize(w)).collect::<String>();
    (model, table)
}

/// Best-effort English singular: `categories` → `category`, `class` stays,
/// otherwise one trailing `s` is dropped. Irregular plurals are not handled.
pub fn singularize(word: &str) -> String {
    if word.len() > 3 && word.ends_with("ies") {
        format!("{}y", &word[..word.len() - 3])
    } else if word.ends_with("ss") {
        word.to_string()
    } else if word.len() > 1 && word.ends_with('s') {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (idx, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if idx > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
