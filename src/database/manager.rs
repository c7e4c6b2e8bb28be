//! The manager database
//!
//! The manager is an ordinary [`DatabaseDescriptor`] registered before any
//! other: it goes through the same create-or-upgrade protocol it runs for
//! everyone else, and its own row ends up in its own table.

use crate::database::core::{
    ManagerRecord, ManagerSchema, TableVersionRecord, MANAGER_DB_NAME, MANAGER_DB_VERSION,
};
use crate::database::descriptor::DatabaseDescriptor;
use crate::database::migration::SqlMigration;
use crate::database::registry::Registry;
use crate::database::table::{Query, Record, RowValues, Table, TableDescriptor};
use crate::error::RegistryResult;
use rusqlite::types::Value;
use std::collections::HashMap;
use std::path::Path;

/// Descriptor of the manager database stored in `directory`
pub fn manager_descriptor(directory: &Path) -> DatabaseDescriptor {
    DatabaseDescriptor::new(MANAGER_DB_NAME, MANAGER_DB_VERSION, directory)
        .with_table(TableDescriptor::with_sql(
            ManagerSchema::DATABASE_TABLE,
            ManagerSchema::CREATE_DATABASE_TABLE,
        ))
        .with_table(TableDescriptor::new(
            ManagerSchema::TABLE_VERSION_TABLE,
            SqlMigration::new(ManagerSchema::CREATE_TABLE_VERSION_TABLE)
                .with_upgrade(1, ManagerSchema::CREATE_TABLE_VERSION_TABLE),
        ))
}

/// Access to the manager's version records
pub struct ManagerTable<'r> {
    registry: &'r Registry,
}

impl<'r> ManagerTable<'r> {
    pub(crate) fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    fn databases(&self) -> Table<'r> {
        Table::new(self.registry, MANAGER_DB_NAME, ManagerSchema::DATABASE_TABLE)
    }

    fn table_versions_table(&self) -> Table<'r> {
        Table::new(
            self.registry,
            MANAGER_DB_NAME,
            ManagerSchema::TABLE_VERSION_TABLE,
        )
    }

    /// Whether the database table exists, checked against `sqlite_master`
    pub fn exists(&self) -> RegistryResult<bool> {
        self.registry
            .open_or_create(MANAGER_DB_NAME)?
            .table_exists(ManagerSchema::DATABASE_TABLE)
    }

    fn tracks_tables(&self) -> RegistryResult<bool> {
        self.registry
            .open_or_create(MANAGER_DB_NAME)?
            .table_exists(ManagerSchema::TABLE_VERSION_TABLE)
    }

    /// Row recorded for database `name`
    pub fn find(&self, name: &str) -> RegistryResult<Option<ManagerRecord>> {
        let rows = self.databases().query(
            &Query::new()
                .columns([
                    ManagerSchema::COL_NAME,
                    ManagerSchema::COL_VERSION,
                    ManagerSchema::COL_DIR,
                ])
                .filter(
                    format!("{} = ?", ManagerSchema::COL_NAME),
                    [name.to_string()],
                )
                .limit(1),
        )?;
        Ok(rows.first().map(to_manager_record))
    }

    /// Every recorded database, ordered by name
    pub fn list(&self) -> RegistryResult<Vec<ManagerRecord>> {
        let rows = self.databases().query(
            &Query::new()
                .columns([
                    ManagerSchema::COL_NAME,
                    ManagerSchema::COL_VERSION,
                    ManagerSchema::COL_DIR,
                ])
                .order_by(ManagerSchema::COL_NAME),
        )?;
        Ok(rows.iter().map(to_manager_record).collect())
    }

    /// Record `descriptor` at `version`, replacing any previous row
    pub fn insert(&self, descriptor: &DatabaseDescriptor, version: u32) -> RegistryResult<i64> {
        self.databases().insert(
            &RowValues::new()
                .with(ManagerSchema::COL_NAME, descriptor.name().to_string())
                .with(ManagerSchema::COL_VERSION, version)
                .with(
                    ManagerSchema::COL_DIR,
                    descriptor.directory().to_string_lossy().to_string(),
                ),
        )
    }

    pub fn update_version(&self, name: &str, version: u32) -> RegistryResult<usize> {
        self.databases().update(
            &RowValues::new().with(ManagerSchema::COL_VERSION, version),
            Some(&format!("{} = ?", ManagerSchema::COL_NAME)),
            &[Value::Text(name.to_string())],
        )
    }

    /// Versions recorded for the tables of `database`
    ///
    /// Empty while the manager still has its version 1 layout.
    pub fn table_versions(&self, database: &str) -> RegistryResult<HashMap<String, u32>> {
        Ok(self
            .table_records(database)?
            .into_iter()
            .map(|r| (r.table, r.version))
            .collect())
    }

    pub fn table_records(&self, database: &str) -> RegistryResult<Vec<TableVersionRecord>> {
        if !self.tracks_tables()? {
            return Ok(Vec::new());
        }
        let rows = self.table_versions_table().query(
            &Query::new()
                .columns([
                    ManagerSchema::COL_DB_NAME,
                    ManagerSchema::COL_TABLE_NAME,
                    ManagerSchema::COL_VERSION,
                ])
                .filter(
                    format!("{} = ?", ManagerSchema::COL_DB_NAME),
                    [database.to_string()],
                )
                .order_by(ManagerSchema::COL_TABLE_NAME),
        )?;
        Ok(rows
            .iter()
            .map(|row| TableVersionRecord {
                database: row
                    .get(ManagerSchema::COL_DB_NAME)
                    .unwrap_or_default(),
                table: row
                    .get(ManagerSchema::COL_TABLE_NAME)
                    .unwrap_or_default(),
                version: row.get(ManagerSchema::COL_VERSION).unwrap_or(1),
            })
            .collect())
    }

    pub fn set_table_version(
        &self,
        database: &str,
        table: &str,
        version: u32,
    ) -> RegistryResult<i64> {
        self.table_versions_table().insert(
            &RowValues::new()
                .with(ManagerSchema::COL_DB_NAME, database.to_string())
                .with(ManagerSchema::COL_TABLE_NAME, table.to_string())
                .with(ManagerSchema::COL_VERSION, version),
        )
    }
}

fn to_manager_record(row: &Record) -> ManagerRecord {
    ManagerRecord {
        name: row.get(ManagerSchema::COL_NAME).unwrap_or_default(),
        version: row.get(ManagerSchema::COL_VERSION).unwrap_or(1),
        directory: row.get(ManagerSchema::COL_DIR).unwrap_or_default(),
    }
}
