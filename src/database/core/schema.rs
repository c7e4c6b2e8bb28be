//! Manager database schema
//!
//! The manager database records the version of every registered database,
//! itself included. Its layout is part of the on-disk contract: files written
//! by an earlier run must keep working after an upgrade.

use serde::Serialize;

/// Reserved name of the manager database file
pub const MANAGER_DB_NAME: &str = "database_manager.db";

/// Current manager database version
///
/// Version 2 added per-table version tracking (`tb_table_info`).
pub const MANAGER_DB_VERSION: u32 = 2;

/// Schema definitions for the manager database
pub struct ManagerSchema;

impl ManagerSchema {
    pub const DATABASE_TABLE: &'static str = "tb_database_info";
    pub const COL_NAME: &'static str = "NAME";
    pub const COL_VERSION: &'static str = "VERSION";
    pub const COL_DIR: &'static str = "DIR";

    pub const TABLE_VERSION_TABLE: &'static str = "tb_table_info";
    pub const COL_DB_NAME: &'static str = "DB_NAME";
    pub const COL_TABLE_NAME: &'static str = "TABLE_NAME";

    /// One row per registered database
    pub const CREATE_DATABASE_TABLE: &'static str = r#"
        CREATE TABLE IF NOT EXISTS tb_database_info (
            NAME TEXT NOT NULL PRIMARY KEY ON CONFLICT REPLACE,
            VERSION INTEGER DEFAULT 1,
            DIR TEXT
        );
    "#;

    /// One row per table of every registered database
    pub const CREATE_TABLE_VERSION_TABLE: &'static str = r#"
        CREATE TABLE IF NOT EXISTS tb_table_info (
            DB_NAME TEXT NOT NULL,
            TABLE_NAME TEXT NOT NULL,
            VERSION INTEGER DEFAULT 1,
            PRIMARY KEY (DB_NAME, TABLE_NAME) ON CONFLICT REPLACE
        );
    "#;
}

/// A row of the manager's database table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "display", derive(tabled::Tabled))]
pub struct ManagerRecord {
    pub name: String,
    pub version: u32,
    pub directory: String,
}

/// A row of the manager's per-table version table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "display", derive(tabled::Tabled))]
pub struct TableVersionRecord {
    pub database: String,
    pub table: String,
    pub version: u32,
}
