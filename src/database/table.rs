//! Table descriptors and table data access
//!
//! A [`TableDescriptor`] declares a table and how it is created and upgraded.
//! A [`Table`] is the CRUD view of a declared table. It never holds a
//! connection: every call resolves the handle through the registry, so handles
//! closed and reopened by the registry are picked up transparently.

use crate::database::core::quote_ident;
use crate::database::migration::{ScriptMigration, SqlMigration, TableMigration};
use crate::database::registry::Registry;
use crate::database::script::ScriptSource;
use crate::error::{RegistryError, RegistryResult};
use rusqlite::types::{FromSql, Value, ValueRef};
use rusqlite::{params_from_iter, Connection};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

/// Declaration of one table owned by a database descriptor
#[derive(Clone)]
pub struct TableDescriptor {
    name: String,
    database: String,
    migration: Arc<dyn TableMigration>,
}

impl fmt::Debug for TableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableDescriptor")
            .field("name", &self.name)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

/// How far an upgrade got
#[derive(Debug)]
pub struct UpgradeProgress {
    /// Last version whose step committed (the starting version if none did)
    pub reached: u32,
    /// The error that stopped the upgrade, if any
    pub error: Option<RegistryError>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>, migration: impl TableMigration + 'static) -> Self {
        Self {
            name: name.into(),
            database: String::new(),
            migration: Arc::new(migration),
        }
    }

    /// A table whose create body is inline SQL
    pub fn with_sql(name: impl Into<String>, create_sql: impl Into<String>) -> Self {
        Self::new(name, SqlMigration::new(create_sql))
    }

    /// A table whose bodies come from `<table>/create` and `<table>/update.<n>.<n+1>` scripts
    pub fn from_scripts(name: impl Into<String>, source: Arc<dyn ScriptSource>) -> Self {
        Self::new(name, ScriptMigration::new(source))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the owning database (empty until the table is declared by one)
    pub fn database(&self) -> &str {
        &self.database
    }

    pub(crate) fn bind(&mut self, database: &str) {
        self.database = database.to_string();
    }

    /// Run the create body in its own transaction
    pub fn create(&self, conn: &Connection) -> RegistryResult<()> {
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| RegistryError::engine("begin transaction", self.name.as_str(), e))?;
        self.migration.create(&tx, &self.name)?;
        tx.commit()
            .map_err(|e| RegistryError::engine("commit", self.name.as_str(), e))?;
        debug!("[database={} table={}] created", self.database, self.name);
        Ok(())
    }

    /// Upgrade one version at a time from `old_version` to `new_version`
    ///
    /// Each step commits on its own, so a failing step leaves every earlier
    /// step applied and reports the last version reached.
    pub fn upgrade(&self, conn: &Connection, old_version: u32, new_version: u32) -> UpgradeProgress {
        let mut reached = old_version;
        while reached < new_version {
            if let Err(e) = self.upgrade_step(conn, reached) {
                return UpgradeProgress {
                    reached,
                    error: Some(e),
                };
            }
            reached += 1;
            debug!(
                "[database={} table={}] upgraded to v{}",
                self.database, self.name, reached
            );
        }
        UpgradeProgress {
            reached,
            error: None,
        }
    }

    fn upgrade_step(&self, conn: &Connection, from: u32) -> RegistryResult<()> {
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| RegistryError::engine("begin transaction", self.name.as_str(), e))?;
        self.migration.upgrade_step(&tx, &self.name, from)?;
        tx.commit()
            .map_err(|e| RegistryError::engine("commit", self.name.as_str(), e))
    }
}

/// Ordered column/value pairs for inserts and updates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowValues {
    values: Vec<(String, Value)>,
}

impl RowValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `column`, replacing an earlier value for the same column
    pub fn put(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.values.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.values.push((column, value)),
        }
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.put(column, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(c, _)| c.as_str())
    }

    fn params(&self) -> impl Iterator<Item = &Value> {
        self.values.iter().map(|(_, v)| v)
    }
}

/// Filter, projection and ordering of a query
#[derive(Debug, Clone, Default)]
pub struct Query {
    columns: Vec<String>,
    selection: Option<String>,
    args: Vec<Value>,
    order_by: Option<String>,
    limit: Option<u32>,
}

impl Query {
    /// All columns of all rows
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// `WHERE` clause with `?` placeholders bound to `args` in order
    pub fn filter<I>(mut self, selection: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.selection = Some(selection.into());
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    fn to_sql(&self, table: &str) -> String {
        let projection = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut sql = format!("SELECT {} FROM {}", projection, quote_ident(table));
        if let Some(selection) = &self.selection {
            sql.push_str(&format!(" WHERE {}", selection));
        }
        if let Some(order_by) = &self.order_by {
            sql.push_str(&format!(" ORDER BY {}", order_by));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        sql
    }
}

/// One row returned by [`Table::query`]
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Record {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn value(&self, column: &str) -> Option<&Value> {
        let idx = self
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))?;
        self.values.get(idx)
    }

    /// Convert the value of `column`, `None` if missing or of the wrong type
    pub fn get<T: FromSql>(&self, column: &str) -> Option<T> {
        let value = self.value(column)?;
        T::column_result(ValueRef::from(value)).ok()
    }
}

/// CRUD access to one declared table
///
/// Failures are logged where they happen and returned as
/// [`RegistryError::EngineOperationFailed`]; an empty result is `Ok(vec![])`.
pub struct Table<'r> {
    registry: &'r Registry,
    database: String,
    table: String,
}

impl<'r> Table<'r> {
    pub(crate) fn new(registry: &'r Registry, database: &str, table: &str) -> Self {
        Self {
            registry,
            database: database.to_string(),
            table: table.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.table
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    fn run<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> RegistryResult<T> {
        let result = self.registry.open_or_create(&self.database).and_then(|handle| {
            handle.with_connection(|conn| {
                f(conn).map_err(|e| RegistryError::engine(operation, self.table.as_str(), e))
            })
        });
        if let Err(e) = &result {
            error!(
                "[database={} table={}] {} failed: {}",
                self.database, self.table, operation, e
            );
        }
        result
    }

    /// Insert a row, returning its rowid
    pub fn insert(&self, values: &RowValues) -> RegistryResult<i64> {
        let sql = if values.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote_ident(&self.table))
        } else {
            let columns: Vec<String> = values.columns().map(quote_ident).collect();
            let placeholders = vec!["?"; values.len()].join(", ");
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(&self.table),
                columns.join(", "),
                placeholders
            )
        };

        self.run("insert", |conn| {
            conn.execute(&sql, params_from_iter(values.params()))?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Update matching rows, returning the number of rows changed
    pub fn update(
        &self,
        values: &RowValues,
        selection: Option<&str>,
        args: &[Value],
    ) -> RegistryResult<usize> {
        let assignments: Vec<String> = values
            .columns()
            .map(|c| format!("{} = ?", quote_ident(c)))
            .collect();
        let mut sql = format!(
            "UPDATE {} SET {}",
            quote_ident(&self.table),
            assignments.join(", ")
        );
        if let Some(selection) = selection {
            sql.push_str(&format!(" WHERE {}", selection));
        }

        self.run("update", |conn| {
            conn.execute(&sql, params_from_iter(values.params().chain(args.iter())))
        })
    }

    /// Delete matching rows (all rows when `selection` is `None`)
    pub fn delete(&self, selection: Option<&str>, args: &[Value]) -> RegistryResult<usize> {
        let mut sql = format!("DELETE FROM {}", quote_ident(&self.table));
        if let Some(selection) = selection {
            sql.push_str(&format!(" WHERE {}", selection));
        }

        self.run("delete", |conn| conn.execute(&sql, params_from_iter(args.iter())))
    }

    /// Run a query against the table
    pub fn query(&self, query: &Query) -> RegistryResult<Vec<Record>> {
        let sql = query.to_sql(&self.table);

        self.run("query", |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let columns: Arc<[String]> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
                .into();
            let width = columns.len();

            let rows = stmt.query_map(params_from_iter(query.args.iter()), |row| {
                (0..width)
                    .map(|idx| row.get::<_, Value>(idx))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?;

            let mut records = Vec::new();
            for values in rows {
                records.push(Record {
                    columns: Arc::clone(&columns),
                    values: values?,
                });
            }
            Ok(records)
        })
    }

    /// Number of rows in the table
    pub fn count(&self) -> RegistryResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&self.table));
        self.run("count", |conn| conn.query_row(&sql, [], |row| row.get(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::descriptor::DatabaseDescriptor;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Registry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::builder()
            .configure_directory(dir.path())
            .configure_database(
                DatabaseDescriptor::new("app.db", 1, dir.path()).with_table(
                    TableDescriptor::with_sql(
                        "users",
                        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER);",
                    ),
                ),
            )
            .build()
            .unwrap();
        (dir, registry)
    }

    #[test]
    fn test_row_values_put_replaces() {
        let values = RowValues::new()
            .with("name", "alice".to_string())
            .with("name", "bob".to_string());
        assert_eq!(values.len(), 1);
        assert_eq!(values.params().next(), Some(&Value::Text("bob".to_string())));
    }

    #[test]
    fn test_query_sql() {
        let query = Query::new()
            .columns(["name"])
            .filter("age > ?", [30i64])
            .order_by("name")
            .limit(5);
        assert_eq!(
            query.to_sql("users"),
            "SELECT \"name\" FROM \"users\" WHERE age > ? ORDER BY name LIMIT 5"
        );
    }

    #[test]
    fn test_crud_round() {
        let (_dir, registry) = setup();
        let users = registry.table("app.db", "users").unwrap();

        let alice = users
            .insert(&RowValues::new().with("name", "alice".to_string()).with("age", 31i64))
            .unwrap();
        users
            .insert(&RowValues::new().with("name", "bob".to_string()).with("age", 25i64))
            .unwrap();
        assert!(alice > 0);
        assert_eq!(users.count().unwrap(), 2);

        let changed = users
            .update(
                &RowValues::new().with("age", 32i64),
                Some("name = ?"),
                &[Value::from("alice".to_string())],
            )
            .unwrap();
        assert_eq!(changed, 1);

        let rows = users
            .query(&Query::new().filter("age > ?", [30i64]).order_by("name"))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<String>("name").as_deref(), Some("alice"));
        assert_eq!(rows[0].get::<i64>("AGE"), Some(32));

        let deleted = users.delete(None, &[]).unwrap();
        assert_eq!(deleted, 2);
        assert!(users.query(&Query::new()).unwrap().is_empty());
    }

    #[test]
    fn test_failure_is_distinguishable_from_empty() {
        let (_dir, registry) = setup();
        let users = registry.table("app.db", "users").unwrap();

        // NOT NULL violation
        let err = users
            .insert(&RowValues::new().with("age", 1i64))
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::EngineOperationFailed {
                operation: "insert",
                ..
            }
        ));

        let err = users
            .query(&Query::new().columns(["no_such_column"]))
            .unwrap_err();
        assert!(matches!(err, RegistryError::EngineOperationFailed { .. }));

        assert!(users.query(&Query::new()).unwrap().is_empty());
    }

    #[test]
    fn test_misspelled_column_fails_with_rows_present() {
        let (_dir, registry) = setup();
        let users = registry.table("app.db", "users").unwrap();
        users
            .insert(&RowValues::new().with("name", "alice".to_string()))
            .unwrap();

        let err = users
            .query(&Query::new().columns(["emial"]))
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::EngineOperationFailed {
                operation: "query",
                ..
            }
        ));

        let err = users
            .update(
                &RowValues::new().with("age", 30i64),
                Some("\"nme\" = 'alice'"),
                &[],
            )
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::EngineOperationFailed {
                operation: "update",
                ..
            }
        ));

        let err = users.delete(Some("\"nme\" = ?"), &[Value::Text("alice".into())]);
        assert!(err.is_err());
        assert_eq!(users.count().unwrap(), 1);
    }

    #[test]
    fn test_table_survives_handle_close() {
        let (_dir, registry) = setup();
        let users = registry.table("app.db", "users").unwrap();
        users
            .insert(&RowValues::new().with("name", "carol".to_string()))
            .unwrap();

        registry.close("app.db").unwrap();
        assert_eq!(users.count().unwrap(), 1);
    }

    #[test]
    fn test_upgrade_reports_progress() {
        let conn = Connection::open_in_memory().unwrap();
        let table = TableDescriptor::new(
            "items",
            SqlMigration::new("CREATE TABLE items (id INTEGER PRIMARY KEY);")
                .with_upgrade(1, "ALTER TABLE items ADD COLUMN a TEXT;")
                .with_upgrade(2, "ALTER TABLE nope ADD COLUMN b TEXT;"),
        );
        table.create(&conn).unwrap();

        let progress = table.upgrade(&conn, 1, 4);
        assert_eq!(progress.reached, 2);
        assert!(progress.error.is_some());
    }
}
