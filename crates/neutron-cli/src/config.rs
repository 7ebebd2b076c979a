//! CLI configuration loading from file and environment variables.

use neutron_db::{Backend, ConnectionSettings, DbError};
use serde::Deserialize;
use thiserror::Error;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Migration and scaffolding locations.
    #[serde(default)]
    pub migrations: MigrationsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Backend name: `sqlite`, `mysql` or `pgsql`.
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Database location; a file path for SQLite.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Busy timeout for the connection, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// Where migrations and generated models live.
#[derive(Debug, Clone, Deserialize)]
pub struct MigrationsConfig {
    /// Directory holding `<timestamp>_<name>.sql` files.
    #[serde(default = "default_migrations_dir")]
    pub directory: String,

    /// Directory generated model sources are written to.
    #[serde(default = "default_models_dir")]
    pub models_directory: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "neutron_db=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_driver() -> String {
    "sqlite".to_string()
}

fn default_db_path() -> String {
    "database/neutron.sqlite".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_migrations_dir() -> String {
    "migrations".to_string()
}

fn default_models_dir() -> String {
    "src/models".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            directory: default_migrations_dir(),
            models_directory: default_models_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl DatabaseConfig {
    /// Resolves the backend and builds connection settings.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connection`] if `driver` names an unknown backend.
    pub fn settings(&self) -> Result<ConnectionSettings, DbError> {
        Ok(ConnectionSettings {
            backend: self.driver.parse::<Backend>()?,
            database: self.path.clone(),
            busy_timeout_ms: self.busy_timeout_ms,
        })
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults, then
/// applies environment overrides.
///
/// Environment variable overrides:
/// - `NEUTRON_DB_CONNECTION` overrides `database.driver`
/// - `NEUTRON_DB_DATABASE` overrides `database.path`
/// - `NEUTRON_MIGRATIONS_DIR` overrides `migrations.directory`
/// - `NEUTRON_LOG_LEVEL` overrides `logging.level`
/// - `NEUTRON_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Applies overrides from `lookup`, which maps a variable name to its value.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(driver) = lookup("NEUTRON_DB_CONNECTION") {
        config.database.driver = driver;
    }
    if let Some(path) = lookup("NEUTRON_DB_DATABASE") {
        config.database.path = path;
    }
    if let Some(dir) = lookup("NEUTRON_MIGRATIONS_DIR") {
        config.migrations.directory = dir;
    }
    if let Some(level) = lookup("NEUTRON_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("NEUTRON_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}
