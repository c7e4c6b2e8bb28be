//! Error types for the database registry.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur while registering, opening or using databases.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The physical file or its directory could not be created or opened.
    #[error("storage unavailable for database '{name}' at {path}: {reason}")]
    StorageUnavailable {
        name: String,
        path: PathBuf,
        reason: String,
    },

    #[error("database '{0}' is not registered")]
    UnregisteredDatabase(String),

    #[error("database '{0}' is already registered")]
    DuplicateRegistration(String),

    #[error("database name '{0}' is reserved for the manager database")]
    ReservedName(String),

    #[error("table '{table}' is not declared by database '{database}'")]
    UnknownTable { database: String, table: String },

    /// A migration script required for an upgrade step is missing.
    #[error("migration script '{0}' not found")]
    ScriptNotFound(String),

    #[error("failed to read migration script '{key}': {reason}")]
    ScriptUnreadable { key: String, reason: String },

    /// The storage engine rejected an operation.
    #[error("{operation} failed on '{target}': {source}")]
    EngineOperationFailed {
        operation: &'static str,
        target: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("connection to {0} has been closed")]
    HandleClosed(PathBuf),
}

impl RegistryError {
    pub(crate) fn engine(
        operation: &'static str,
        target: impl Into<String>,
        source: rusqlite::Error,
    ) -> Self {
        RegistryError::EngineOperationFailed {
            operation,
            target: target.into(),
            source,
        }
    }

    /// Whether this error came from a missing migration script.
    pub fn is_script_not_found(&self) -> bool {
        matches!(self, RegistryError::ScriptNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RegistryError::UnregisteredDatabase("missing.db".to_string());
        assert_eq!(err.to_string(), "database 'missing.db' is not registered");

        let err = RegistryError::ScriptNotFound("users/update.2.3".to_string());
        assert!(err.is_script_not_found());
        assert!(err.to_string().contains("users/update.2.3"));
    }

    #[test]
    fn test_engine_error_keeps_source() {
        let err = RegistryError::engine(
            "insert",
            "users",
            rusqlite::Error::QueryReturnedNoRows,
        );
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().starts_with("insert failed on 'users'"));
    }
}
