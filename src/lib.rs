#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! dbregistry - versioned SQLite databases behind one registry
//!
//! dbregistry lets an application declare several independently versioned
//! SQLite databases, each owning a set of tables, and guarantees that every
//! database is created or upgraded exactly once to the version the application
//! expects before anything queries it.
//!
//! # Feature Flags
//!
//! | Feature | Description | Key Dependencies |
//! |---------|-------------|------------------|
//! | `display` | Table formatting of manager records | `tabled` |
//! | `cli` | The `dbregistry` inspection binary | `clap`, `tracing-subscriber` |
//!
//! # Architecture
//!
//! - **[`database`]**: the registry, descriptors, migrations and table access
//!   - `core`: SQLite connection wrapper and the manager database layout
//!   - `registry`: name -> descriptor and name -> connection, registration protocol
//!   - `manager`: the manager database, registered through the same protocol
//! - **[`config`]**: configuration file and environment handling
//! - **[`error`]**: the error taxonomy
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use dbregistry::{DatabaseDescriptor, Registry, RowValues, TableDescriptor};
//!
//! let registry = Registry::builder()
//!     .configure_directory("/var/lib/myapp")
//!     .configure_database(
//!         DatabaseDescriptor::new("app.db", 1, "/var/lib/myapp")
//!             .with_table(TableDescriptor::with_sql(
//!                 "users",
//!                 "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);",
//!             )),
//!     )
//!     .build()?;
//!
//! let users = registry.table("app.db", "users")?;
//! let id = users.insert(&RowValues::new().with("name", "alice".to_string()))?;
//! ```
//!
//! # Migration Scripts
//!
//! Tables built with [`TableDescriptor::from_scripts`] read their bodies from a
//! [`ScriptSource`]: `<table>/create` on creation, and one
//! `<table>/update.<n>.<n+1>` per version step on upgrade. A jump from 1 to 4
//! needs all three step scripts; a missing one stops the table at the last
//! version it reached, and the next start resumes from there.

pub mod config;
pub mod database;
pub mod error;

// =============================================================================
// Configuration
// =============================================================================

pub use config::RegistryConfig;

// =============================================================================
// Errors
// =============================================================================

pub use error::{RegistryError, RegistryResult};

// =============================================================================
// Database Module - Re-export commonly used types
// =============================================================================

pub use database::{
    ConnectionHandle, DatabaseConn, DatabaseDescriptor, DirectoryScripts, ManagerRecord,
    MemoryScripts, Query, Record, RegistrationOutcome, RegistrationReport, Registry,
    RegistryBuilder, RowValues, ScriptMigration, ScriptSource, SqlMigration, Table,
    TableDescriptor, TableMigration, MANAGER_DB_NAME,
};
