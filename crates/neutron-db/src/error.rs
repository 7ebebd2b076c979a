//! Error types shared by every database operation.

use thiserror::Error;

/// A boxed error produced by a backend driver.
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convenience alias for results carrying a [`DbError`].
pub type Result<T> = std::result::Result<T, DbError>;

/// Errors that can occur while building, sending or hydrating a statement.
#[derive(Debug, Error)]
pub enum DbError {
    /// Malformed identifier, operator or other caller input. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// The backend is unreachable, unsupported or was never configured.
    #[error("connection error: {0}")]
    Connection(String),

    /// The backend rejected a statement.
    #[error("execution error ({context}): {source}")]
    Execution {
        /// What was being executed, usually the table or statement kind.
        context: String,
        /// The underlying driver error.
        source: BackendError,
    },

    /// A row could not be converted into the requested type.
    #[error("failed to hydrate column '{column}': {message}")]
    Hydration {
        /// The column that failed to convert.
        column: String,
        /// Why the conversion failed.
        message: String,
    },
}

impl DbError {
    /// Wraps a driver error with identifying context.
    pub fn execution(context: impl Into<String>, source: impl Into<BackendError>) -> Self {
        Self::Execution {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Re-labels an execution error with a more specific context, leaving
    /// every other variant untouched.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        match self {
            Self::Execution { source, .. } => Self::Execution {
                context: context.into(),
                source,
            },
            other => other,
        }
    }
}
