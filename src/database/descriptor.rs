//! Database descriptors
//!
//! A [`DatabaseDescriptor`] declares a logical database: its name (also the
//! physical file name), version, directory and the ordered list of tables it
//! owns. Creating or upgrading a database cascades to each table in
//! declaration order, with every table isolated from its siblings' failures.

use crate::database::table::TableDescriptor;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct DatabaseDescriptor {
    name: String,
    version: u32,
    directory: PathBuf,
    tables: Vec<TableDescriptor>,
}

/// Result of creating or upgrading one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableOutcome {
    pub table: String,
    /// Version the table is at afterwards, `None` if its create body failed
    pub version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-table results of one create or upgrade cascade
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PropagationReport {
    pub tables: Vec<TableOutcome>,
}

impl PropagationReport {
    /// Lowest version reached by any table, or `target` when nothing fell short
    pub fn reached_version(&self, target: u32) -> u32 {
        self.tables
            .iter()
            .filter_map(|t| t.version)
            .fold(target, u32::min)
    }

    pub fn failed_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| !t.is_ok())
            .map(|t| t.table.as_str())
            .collect()
    }
}

impl DatabaseDescriptor {
    /// Declare a database stored at `<directory>/<name>`
    ///
    /// Versions start at 1; a zero version is raised to 1.
    pub fn new(name: impl Into<String>, version: u32, directory: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            version: version.max(1),
            directory: directory.as_ref().to_path_buf(),
            tables: Vec::new(),
        }
    }

    /// Declare the next table
    ///
    /// Tables are created and upgraded in the order they are declared. Tables
    /// with an empty or already declared name are skipped.
    pub fn with_table(mut self, mut table: TableDescriptor) -> Self {
        if table.name().is_empty() {
            warn!("database {}: ignoring table with empty name", self.name);
            return self;
        }
        if self.table(table.name()).is_some() {
            warn!(
                "database {}: table {} declared twice, keeping the first",
                self.name,
                table.name()
            );
            return self;
        }
        table.bind(&self.name);
        self.tables.push(table);
        self
    }

    pub fn with_tables(self, tables: impl IntoIterator<Item = TableDescriptor>) -> Self {
        tables.into_iter().fold(self, |db, table| db.with_table(table))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the physical file
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.name)
    }

    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.name() == name)
    }

    /// Create every table on a fresh database
    pub fn create(&self, conn: &Connection) -> PropagationReport {
        info!("[database={} version={}] creating", self.name, self.version);
        let tables = self
            .tables
            .iter()
            .map(|table| match table.create(conn) {
                Ok(()) => TableOutcome {
                    table: table.name().to_string(),
                    version: Some(self.version),
                    error: None,
                },
                Err(e) => {
                    error!(
                        "[database={} table={}] create failed: {}",
                        self.name,
                        table.name(),
                        e
                    );
                    TableOutcome {
                        table: table.name().to_string(),
                        version: None,
                        error: Some(e.to_string()),
                    }
                }
            })
            .collect();
        PropagationReport { tables }
    }

    /// Upgrade every table to this descriptor's version
    ///
    /// Each table starts from its own entry in `table_versions`, falling back
    /// to `stored_version` for tables without one.
    pub fn upgrade(
        &self,
        conn: &Connection,
        stored_version: u32,
        table_versions: &HashMap<String, u32>,
    ) -> PropagationReport {
        info!(
            "[database={}] upgrading v{} -> v{}",
            self.name, stored_version, self.version
        );
        let tables = self
            .tables
            .iter()
            .map(|table| {
                let from = table_versions
                    .get(table.name())
                    .copied()
                    .unwrap_or(stored_version);
                let progress = table.upgrade(conn, from, self.version);
                if let Some(e) = &progress.error {
                    error!(
                        "[database={} table={}] upgrade stopped at v{}: {}",
                        self.name,
                        table.name(),
                        progress.reached,
                        e
                    );
                }
                TableOutcome {
                    table: table.name().to_string(),
                    version: Some(progress.reached),
                    error: progress.error.map(|e| e.to_string()),
                }
            })
            .collect();
        PropagationReport { tables }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::migration::SqlMigration;

    fn users() -> TableDescriptor {
        TableDescriptor::with_sql("users", "CREATE TABLE users (id INTEGER PRIMARY KEY);")
    }

    #[test]
    fn test_declaration_order_and_dedup() {
        let db = DatabaseDescriptor::new("app.db", 1, "/tmp")
            .with_table(users())
            .with_table(TableDescriptor::with_sql("orders", ""))
            .with_table(users())
            .with_table(TableDescriptor::with_sql("", ""));

        let names: Vec<&str> = db.tables().iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["users", "orders"]);
        assert_eq!(db.tables()[0].database(), "app.db");
        assert_eq!(db.path(), PathBuf::from("/tmp/app.db"));
    }

    #[test]
    fn test_create_isolates_table_failures() {
        let conn = Connection::open_in_memory().unwrap();
        let db = DatabaseDescriptor::new("app.db", 3, "/tmp")
            .with_table(TableDescriptor::with_sql("broken", "CREATE TABLE broken ("))
            .with_table(users());

        let report = db.create(&conn);
        assert_eq!(report.failed_tables(), vec!["broken"]);
        assert_eq!(report.tables[1].version, Some(3));
        assert_eq!(report.reached_version(3), 3);
        conn.execute("INSERT INTO users DEFAULT VALUES", []).unwrap();
    }

    #[test]
    fn test_upgrade_uses_per_table_versions() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE a (id INTEGER PRIMARY KEY, x TEXT);
             CREATE TABLE b (id INTEGER PRIMARY KEY);",
        )
        .unwrap();

        let db = DatabaseDescriptor::new("app.db", 2, "/tmp")
            .with_table(TableDescriptor::new(
                "a",
                SqlMigration::new("").with_upgrade(1, "ALTER TABLE a ADD COLUMN x TEXT;"),
            ))
            .with_table(TableDescriptor::new(
                "b",
                SqlMigration::new("").with_upgrade(1, "ALTER TABLE b ADD COLUMN y TEXT;"),
            ));

        // table a already reached v2 on an earlier run, so its step is not replayed
        let versions = HashMap::from([("a".to_string(), 2)]);
        let report = db.upgrade(&conn, 1, &versions);
        assert!(report.failed_tables().is_empty());
        assert_eq!(report.reached_version(2), 2);
        conn.execute("INSERT INTO b (y) VALUES ('ok')", []).unwrap();
    }

    #[test]
    fn test_reached_version_is_minimum() {
        let report = PropagationReport {
            tables: vec![
                TableOutcome {
                    table: "a".to_string(),
                    version: Some(4),
                    error: None,
                },
                TableOutcome {
                    table: "b".to_string(),
                    version: Some(2),
                    error: Some("missing".to_string()),
                },
            ],
        };
        assert_eq!(report.reached_version(4), 2);
        assert_eq!(PropagationReport::default().reached_version(7), 7);
    }
}
