//! Migration script resources and execution
//!
//! Scripts are looked up by key: `<table>/create` for the create body and
//! `<table>/update.<n>.<n+1>` for each single-version upgrade step. A script is
//! UTF-8 text made of statements terminated by `;`; the statements are passed
//! to SQLite verbatim.

use crate::error::{RegistryError, RegistryResult};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resource key of a table's create script
pub fn create_key(table: &str) -> String {
    format!("{}/create", table)
}

/// Resource key of the upgrade script from `from` to `from + 1`
pub fn upgrade_key(table: &str, from: u32) -> String {
    format!("{}/update.{}.{}", table, from, from + 1)
}

/// A provider of migration scripts
pub trait ScriptSource: Send + Sync {
    /// Load the script stored under `key`, `Ok(None)` if there is none
    fn load(&self, key: &str) -> RegistryResult<Option<String>>;
}

/// Scripts stored as files below a root directory
///
/// Key `users/update.1.2` resolves to `<root>/users/update.1.2.sql`.
#[derive(Debug, Clone)]
pub struct DirectoryScripts {
    root: PathBuf,
}

impl DirectoryScripts {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn script_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.sql", key))
    }
}

impl ScriptSource for DirectoryScripts {
    fn load(&self, key: &str) -> RegistryResult<Option<String>> {
        let path = self.script_path(key);
        if !path.is_file() {
            return Ok(None);
        }
        std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| RegistryError::ScriptUnreadable {
                key: key.to_string(),
                reason: format!("{}: {}", path.display(), e),
            })
    }
}

/// Scripts held in memory, e.g. embedded with `include_str!`
#[derive(Debug, Clone, Default)]
pub struct MemoryScripts {
    scripts: HashMap<String, String>,
}

impl MemoryScripts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a script under `key`, replacing any previous one
    pub fn with_script(mut self, key: impl Into<String>, script: impl Into<String>) -> Self {
        self.insert(key, script);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, script: impl Into<String>) {
        self.scripts.insert(key.into(), script.into());
    }
}

impl ScriptSource for MemoryScripts {
    fn load(&self, key: &str) -> RegistryResult<Option<String>> {
        Ok(self.scripts.get(key).cloned())
    }
}

/// Split a script into the statement chunks that are executed one by one
///
/// Lines accumulate until one ends with `;`, which flushes the buffer. Any
/// non-blank remainder at the end forms a final chunk.
pub fn split_statements(script: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut buffer = String::new();

    for line in script.lines() {
        buffer.push_str(line);
        buffer.push('\n');
        if line.trim_end().ends_with(';') {
            chunks.push(std::mem::take(&mut buffer));
        }
    }
    if !buffer.trim().is_empty() {
        chunks.push(buffer);
    }

    chunks
}

/// Run every statement of `script` on `conn`
///
/// No transaction is opened here: table creation and each upgrade step already
/// run inside one, so a failing statement discards the whole script.
pub(crate) fn run_script(conn: &Connection, key: &str, script: &str) -> RegistryResult<()> {
    for chunk in split_statements(script) {
        conn.execute_batch(&chunk)
            .map_err(|e| RegistryError::engine("execute script", key, e))?;
    }
    debug!("executed script {}", key);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys() {
        assert_eq!(create_key("users"), "users/create");
        assert_eq!(upgrade_key("users", 3), "users/update.3.4");
    }

    #[test]
    fn test_split_statements() {
        let script = "CREATE TABLE a (\n  id INTEGER\n);\nINSERT INTO a VALUES (1);\n\nINSERT INTO a VALUES (2)";
        let chunks = split_statements(script);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].starts_with("CREATE TABLE a"));
        assert!(chunks[0].trim_end().ends_with(';'));
        assert!(chunks[2].contains("VALUES (2)"));
    }

    #[test]
    fn test_split_ignores_trailing_blank_lines() {
        let chunks = split_statements("SELECT 1;\r\n\r\n   \n");
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_run_script_executes_every_statement() {
        let conn = Connection::open_in_memory().unwrap();
        run_script(
            &conn,
            "t/create",
            "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT);\nINSERT INTO t (v) VALUES ('x');\nINSERT INTO t (v) VALUES ('y')",
        )
        .unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_run_script_stops_at_first_failure() {
        let conn = Connection::open_in_memory().unwrap();
        let err = run_script(
            &conn,
            "t/create",
            "CREATE TABLE t (id INTEGER PRIMARY KEY);\nINSERT INTO missing VALUES (1);\nCREATE TABLE u (id INTEGER);",
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::EngineOperationFailed { .. }));
        assert!(crate::database::core::table_exists(&conn, "t").unwrap());
        assert!(!crate::database::core::table_exists(&conn, "u").unwrap());
    }

    #[test]
    fn test_memory_scripts() {
        let scripts = MemoryScripts::new().with_script("users/create", "SELECT 1;");
        assert_eq!(
            scripts.load("users/create").unwrap().as_deref(),
            Some("SELECT 1;")
        );
        assert!(scripts.load("users/update.1.2").unwrap().is_none());
    }

    #[test]
    fn test_directory_scripts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("users")).unwrap();
        std::fs::write(dir.path().join("users/update.1.2.sql"), "SELECT 2;").unwrap();

        let scripts = DirectoryScripts::new(dir.path());
        assert_eq!(
            scripts.load("users/update.1.2").unwrap().as_deref(),
            Some("SELECT 2;")
        );
        assert!(scripts.load("users/create").unwrap().is_none());
    }
}
