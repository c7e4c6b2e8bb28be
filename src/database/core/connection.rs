//! Database connection management
//!
//! This module provides the connection handle shared between the registry and
//! every table that reads or writes a registered database.

use crate::error::{RegistryError, RegistryResult};
use parking_lot::Mutex;
use rusqlite::config::DbConfig;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared handle to one open physical database file.
pub type ConnectionHandle = Arc<DatabaseConn>;

/// Core database connection wrapper
///
/// `DatabaseConn` wraps one SQLite connection behind a mutex so that a cached
/// handle can be shared by several threads. A closed handle keeps its path but
/// refuses further work; the registry evicts and reopens it on next access.
pub struct DatabaseConn {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl DatabaseConn {
    /// Open (or create) the database file at `path`
    ///
    /// The connection is configured with the same pragmas on every open.
    pub fn open(path: &Path) -> RegistryResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| RegistryError::engine("open", path.display().to_string(), e))?;
        Self::configure(&conn, path)?;
        debug!("opened database file {}", path.display());

        Ok(DatabaseConn {
            path: path.to_path_buf(),
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Configure the database with the registry's connection settings
    fn configure(conn: &Connection, path: &Path) -> RegistryResult<()> {
        let target = path.display().to_string();

        // WAL lets readers proceed while a migration holds the write lock
        let _: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(|e| RegistryError::engine("set journal mode", target.as_str(), e))?;

        conn.execute_batch(
            "PRAGMA synchronous=NORMAL;
             PRAGMA temp_store=MEMORY;
             PRAGMA foreign_keys=ON;",
        )
        .map_err(|e| RegistryError::engine("configure", target.as_str(), e))?;

        // a double-quoted name must never fall back to a string literal
        for flag in [DbConfig::SQLITE_DBCONFIG_DQS_DML, DbConfig::SQLITE_DBCONFIG_DQS_DDL] {
            conn.set_db_config(flag, false)
                .map_err(|e| RegistryError::engine("configure", target.as_str(), e))?;
        }

        Ok(())
    }

    /// Path of the physical file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the underlying connection is still usable
    pub fn is_open(&self) -> bool {
        self.conn.lock().is_some()
    }

    /// Close the underlying connection
    ///
    /// Closing an already closed handle is a no-op.
    pub fn close(&self) -> RegistryResult<()> {
        let taken = self.conn.lock().take();
        if let Some(conn) = taken {
            if let Err((_, e)) = conn.close() {
                warn!("closing {} reported an error: {}", self.path.display(), e);
                return Err(RegistryError::engine(
                    "close",
                    self.path.display().to_string(),
                    e,
                ));
            }
        }
        Ok(())
    }

    /// Run `f` with exclusive access to the connection
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> RegistryResult<T>,
    ) -> RegistryResult<T> {
        let guard = self.conn.lock();
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(RegistryError::HandleClosed(self.path.clone())),
        }
    }

    /// Check if a table exists in the database
    pub fn table_exists(&self, table_name: &str) -> RegistryResult<bool> {
        self.with_connection(|conn| table_exists(conn, table_name))
    }
}

/// Check table existence through `sqlite_master`
pub fn table_exists(conn: &Connection, table_name: &str) -> RegistryResult<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [table_name],
            |row| row.get(0),
        )
        .map_err(|e| RegistryError::engine("check table existence", table_name, e))?;
    Ok(count > 0)
}

/// Quote an identifier for interpolation into SQL
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(dir: &tempfile::TempDir) -> DatabaseConn {
        let db = DatabaseConn::open(&dir.path().join("test.db")).unwrap();
        db.with_connection(|conn| {
            conn.execute_batch("CREATE TABLE test_table (id INTEGER PRIMARY KEY, name TEXT);")
                .map_err(|e| RegistryError::engine("create", "test_table", e))
        })
        .unwrap();
        db
    }

    #[test]
    fn test_table_exists() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(&dir);

        assert!(db.table_exists("test_table").unwrap());
        assert!(!db.table_exists("nonexistent_table").unwrap());
    }

    #[test]
    fn test_quoted_unknown_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(&dir);

        let result = db.with_connection(|conn| {
            conn.query_row("SELECT \"nmae\" FROM test_table", [], |_| Ok(()))
                .map_err(|e| RegistryError::engine("query", "test_table", e))
        });
        assert!(matches!(
            result,
            Err(RegistryError::EngineOperationFailed { .. })
        ));
    }

    #[test]
    fn test_close_rejects_further_work() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(&dir);
        assert!(db.is_open());

        db.close().unwrap();
        assert!(!db.is_open());
        assert!(matches!(
            db.table_exists("test_table"),
            Err(RegistryError::HandleClosed(_))
        ));

        // second close is harmless
        assert!(db.close().is_ok());
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
