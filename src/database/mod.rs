//! Database module
//!
//! This module provides the registry and everything it is built from:
//!
//! - **core**: SQLite connection wrapper and the manager database layout
//! - **script**: migration script resources and execution
//! - **migration**: create/upgrade bodies of a table (inline SQL or scripts)
//! - **table**: table descriptors and CRUD access
//! - **descriptor**: database descriptors and create/upgrade propagation
//! - **manager**: the self-hosted manager database
//! - **registry**: the registry, its builder and the connection cache
//!
//! # Architecture
//!
//! ```text
//! Registry ──owns──> DatabaseDescriptor ──owns──> TableDescriptor
//!    │                                               │
//!    └── connection cache <──── name lookup ─────────┘ (Table CRUD)
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use dbregistry::database::{DatabaseDescriptor, DirectoryScripts, Registry, TableDescriptor};
//! use std::sync::Arc;
//!
//! let scripts = Arc::new(DirectoryScripts::new("./sql"));
//! let registry = Registry::builder()
//!     .configure_directory("~/.dbregistry")
//!     .configure_database(
//!         DatabaseDescriptor::new("app.db", 2, "~/.dbregistry/data")
//!             .with_table(TableDescriptor::from_scripts("users", scripts.clone())),
//!     )
//!     .build()?;
//!
//! let users = registry.table("app.db", "users")?;
//! let rows = users.query(&Query::new().filter("name = ?", ["alice".to_string()]))?;
//! ```

pub mod core;
pub mod descriptor;
pub mod manager;
pub mod migration;
pub mod registry;
pub mod script;
pub mod table;

pub use self::core::{
    ConnectionHandle, DatabaseConn, ManagerRecord, ManagerSchema, TableVersionRecord,
    MANAGER_DB_NAME, MANAGER_DB_VERSION,
};
pub use descriptor::{DatabaseDescriptor, PropagationReport, TableOutcome};
pub use manager::{manager_descriptor, ManagerTable};
pub use migration::{ScriptMigration, SqlMigration, TableMigration};
pub use registry::{
    RegistrationFailure, RegistrationOutcome, RegistrationReport, Registry, RegistryBuilder,
};
pub use script::{DirectoryScripts, MemoryScripts, ScriptSource};
pub use table::{Query, Record, RowValues, Table, TableDescriptor, UpgradeProgress};

/// Ensure the data directory exists
pub fn ensure_data_dir(data_dir: &str) -> anyhow::Result<()> {
    std::fs::create_dir_all(data_dir)
        .map_err(|e| anyhow::anyhow!("Failed to create data directory '{}': {}", data_dir, e))
}
