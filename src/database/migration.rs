//! Table create/upgrade bodies
//!
//! A [`TableMigration`] supplies the create body of a table and the body of
//! each single-version upgrade step. Transactions and step iteration belong to
//! the caller; a migration only runs statements on the connection it is given.

use crate::database::script::{create_key, run_script, upgrade_key, ScriptSource};
use crate::error::{RegistryError, RegistryResult};
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub trait TableMigration: Send + Sync {
    /// Create the table on a fresh database
    fn create(&self, conn: &Connection, table: &str) -> RegistryResult<()>;

    /// Upgrade the table from version `from` to `from + 1`
    fn upgrade_step(&self, conn: &Connection, table: &str, from: u32) -> RegistryResult<()>;
}

/// Inline SQL bodies
///
/// Steps without SQL are treated as "nothing changed for this table".
#[derive(Debug, Clone, Default)]
pub struct SqlMigration {
    create: String,
    steps: BTreeMap<u32, String>,
}

impl SqlMigration {
    pub fn new(create: impl Into<String>) -> Self {
        Self {
            create: create.into(),
            steps: BTreeMap::new(),
        }
    }

    /// Add the SQL run when upgrading from `from` to `from + 1`
    pub fn with_upgrade(mut self, from: u32, sql: impl Into<String>) -> Self {
        self.steps.insert(from, sql.into());
        self
    }
}

impl TableMigration for SqlMigration {
    fn create(&self, conn: &Connection, table: &str) -> RegistryResult<()> {
        if self.create.trim().is_empty() {
            return Ok(());
        }
        conn.execute_batch(&self.create)
            .map_err(|e| RegistryError::engine("create", table, e))
    }

    fn upgrade_step(&self, conn: &Connection, table: &str, from: u32) -> RegistryResult<()> {
        match self.steps.get(&from) {
            Some(sql) => conn
                .execute_batch(sql)
                .map_err(|e| RegistryError::engine("upgrade", table, e)),
            None => {
                debug!("table {} has no inline step {} -> {}", table, from, from + 1);
                Ok(())
            }
        }
    }
}

/// Bodies resolved from a [`ScriptSource`]
///
/// A missing create script leaves the table without a create body. A missing
/// upgrade script is an error, so a multi-version jump never skips a step.
#[derive(Clone)]
pub struct ScriptMigration {
    source: Arc<dyn ScriptSource>,
}

impl ScriptMigration {
    pub fn new(source: Arc<dyn ScriptSource>) -> Self {
        Self { source }
    }
}

impl TableMigration for ScriptMigration {
    fn create(&self, conn: &Connection, table: &str) -> RegistryResult<()> {
        let key = create_key(table);
        match self.source.load(&key)? {
            Some(script) => run_script(conn, &key, &script),
            None => {
                debug!("no create script for table {}", table);
                Ok(())
            }
        }
    }

    fn upgrade_step(&self, conn: &Connection, table: &str, from: u32) -> RegistryResult<()> {
        let key = upgrade_key(table, from);
        let script = self
            .source
            .load(&key)?
            .ok_or_else(|| RegistryError::ScriptNotFound(key.clone()))?;
        run_script(conn, &key, &script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::script::MemoryScripts;

    #[test]
    fn test_sql_migration_missing_step_is_noop() {
        let conn = Connection::open_in_memory().unwrap();
        let migration = SqlMigration::new("CREATE TABLE users (id INTEGER PRIMARY KEY);")
            .with_upgrade(2, "ALTER TABLE users ADD COLUMN email TEXT;");

        migration.create(&conn, "users").unwrap();
        migration.upgrade_step(&conn, "users", 1).unwrap();
        migration.upgrade_step(&conn, "users", 2).unwrap();

        conn.execute("INSERT INTO users (email) VALUES ('a@b.c')", [])
            .unwrap();
    }

    #[test]
    fn test_script_migration_requires_every_step() {
        let conn = Connection::open_in_memory().unwrap();
        let scripts = MemoryScripts::new()
            .with_script("users/create", "CREATE TABLE users (id INTEGER PRIMARY KEY);")
            .with_script("users/update.1.2", "ALTER TABLE users ADD COLUMN name TEXT;");
        let migration = ScriptMigration::new(Arc::new(scripts));

        migration.create(&conn, "users").unwrap();
        migration.upgrade_step(&conn, "users", 1).unwrap();

        let err = migration.upgrade_step(&conn, "users", 2).unwrap_err();
        assert!(err.is_script_not_found());
    }

    #[test]
    fn test_script_migration_without_create_script() {
        let conn = Connection::open_in_memory().unwrap();
        let migration = ScriptMigration::new(Arc::new(MemoryScripts::new()));
        assert!(migration.create(&conn, "ghost").is_ok());
    }
}
