//! Core database infrastructure
//!
//! This module provides the foundational database components used by the registry:
//! - `DatabaseConn`: SQLite connection wrapper shared through the connection cache
//! - `ManagerSchema`: on-disk layout of the manager database

mod connection;
mod schema;

pub use connection::{quote_ident, table_exists, ConnectionHandle, DatabaseConn};
pub use schema::{
    ManagerRecord, ManagerSchema, TableVersionRecord, MANAGER_DB_NAME, MANAGER_DB_VERSION,
};
