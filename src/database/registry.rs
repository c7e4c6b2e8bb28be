//! The database registry
//!
//! [`Registry`] maps logical database names to descriptors and to lazily
//! opened connection handles. Registration runs every descriptor, the manager
//! first, through the create-or-upgrade protocol:
//!
//! ```text
//! register(D)
//!   ├── manager table missing? ── create the manager (same protocol)
//!   ├── no row for D        ── create all tables, insert (D, V, dir)
//!   ├── row at v < V        ── upgrade tables v -> V, record reached version
//!   └── row at v >= V       ── nothing to do
//! ```

use crate::config::default_data_dir;
use crate::database::core::{ConnectionHandle, DatabaseConn, MANAGER_DB_NAME};
use crate::database::descriptor::{DatabaseDescriptor, PropagationReport};
use crate::database::manager::{manager_descriptor, ManagerTable};
use crate::database::table::Table;
use crate::error::{RegistryError, RegistryResult};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

type Slot = Arc<Mutex<Option<ConnectionHandle>>>;

/// What registration did to a database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegistrationOutcome {
    /// No prior record: every table was created
    Created,
    /// Tables were upgraded; `to` is the version actually recorded
    Upgraded { from: u32, to: u32 },
    /// The recorded version already matched
    Unchanged,
    /// The recorded version is newer than the descriptor's; left untouched
    NewerOnDisk { stored: u32 },
}

/// Result of registering one database, kept for inspection after startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationReport {
    pub database: String,
    /// Version recorded in the manager afterwards
    pub version: u32,
    pub outcome: RegistrationOutcome,
    pub tables: PropagationReport,
}

impl RegistrationReport {
    /// Whether every table reached the descriptor's version without error
    pub fn is_complete(&self) -> bool {
        self.tables.failed_tables().is_empty()
    }
}

/// A descriptor that could not be registered while building the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationFailure {
    pub database: String,
    pub error: String,
}

/// Registry of logical databases
///
/// Construct one at startup with [`Registry::builder`] and share it by
/// reference. All methods take `&self`; the registry is `Send + Sync`.
pub struct Registry {
    directory: PathBuf,
    descriptors: RwLock<HashMap<String, Arc<DatabaseDescriptor>>>,
    slots: Mutex<HashMap<String, Slot>>,
    reports: RwLock<HashMap<String, RegistrationReport>>,
    failures: Mutex<Vec<RegistrationFailure>>,
    physical_opens: AtomicUsize,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    fn new(directory: PathBuf) -> Self {
        Self {
            directory,
            descriptors: RwLock::new(HashMap::new()),
            slots: Mutex::new(HashMap::new()),
            reports: RwLock::new(HashMap::new()),
            failures: Mutex::new(Vec::new()),
            physical_opens: AtomicUsize::new(0),
        }
    }

    /// Register the manager database through the regular protocol
    fn bootstrap(&self) -> RegistryResult<()> {
        let manager = Arc::new(manager_descriptor(&self.directory));
        self.descriptors.write().insert(MANAGER_DB_NAME.to_string(), Arc::clone(&manager));

        let report = self.create_or_upgrade(&manager)?;
        info!(
            "manager database ready at {} (v{})",
            manager.path().display(),
            report.version
        );
        self.reports.write().insert(MANAGER_DB_NAME.to_string(), report);
        Ok(())
    }

    /// Directory holding the manager database
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Register an application database
    ///
    /// Fails without side effects for the reserved manager name or a name
    /// already registered. If the protocol itself fails, the descriptor is
    /// dropped again and `lookup` will not find it.
    pub fn register(&self, descriptor: DatabaseDescriptor) -> RegistryResult<&Self> {
        let name = descriptor.name().to_string();
        if name == MANAGER_DB_NAME {
            return Err(RegistryError::ReservedName(name));
        }

        let descriptor = Arc::new(descriptor);
        {
            let mut descriptors = self.descriptors.write();
            if descriptors.contains_key(&name) {
                return Err(RegistryError::DuplicateRegistration(name));
            }
            descriptors.insert(name.clone(), Arc::clone(&descriptor));
        }

        match self.create_or_upgrade(&descriptor) {
            Ok(report) => {
                if !report.is_complete() {
                    warn!(
                        "database {} registered with failed tables: {:?}",
                        name,
                        report.tables.failed_tables()
                    );
                }
                self.reports.write().insert(name, report);
                Ok(self)
            }
            Err(e) => {
                error!("failed to register database {}: {}", name, e);
                self.descriptors.write().remove(&name);
                if let Err(close_err) = self.close(&name) {
                    debug!("closing {} after failed registration: {}", name, close_err);
                }
                Err(e)
            }
        }
    }

    fn create_or_upgrade(&self, descriptor: &DatabaseDescriptor) -> RegistryResult<RegistrationReport> {
        let manager = self.manager();
        let name = descriptor.name();
        let version = descriptor.version();

        if name != MANAGER_DB_NAME && !manager.exists()? {
            warn!("manager table missing, recreating it before registering {}", name);
            let manager_descriptor = self
                .lookup(MANAGER_DB_NAME)
                .ok_or_else(|| RegistryError::UnregisteredDatabase(MANAGER_DB_NAME.to_string()))?;
            self.create_or_upgrade(&manager_descriptor)?;
        }

        // engine-level check first: the manager cannot read its own row before its table exists
        let stored = if manager.exists()? {
            manager.find(name)?
        } else {
            None
        };

        let handle = self.open_or_create(name)?;
        let report = match stored {
            None => {
                let tables = handle.with_connection(|conn| Ok(descriptor.create(conn)))?;
                manager.insert(descriptor, version)?;
                self.record_tables(name, &tables)?;
                info!("[database={} version={}] created", name, version);
                RegistrationReport {
                    database: name.to_string(),
                    version,
                    outcome: RegistrationOutcome::Created,
                    tables,
                }
            }
            Some(record) if record.version < version => {
                let table_versions = manager.table_versions(name)?;
                let tables = handle.with_connection(|conn| {
                    Ok(descriptor.upgrade(conn, record.version, &table_versions))
                })?;
                self.record_tables(name, &tables)?;

                let reached = tables.reached_version(version);
                if reached > record.version {
                    manager.update_version(name, reached)?;
                }
                if reached < version {
                    warn!(
                        "[database={}] upgrade to v{} stopped at v{}",
                        name, version, reached
                    );
                } else {
                    info!("[database={}] upgraded v{} -> v{}", name, record.version, version);
                }
                RegistrationReport {
                    database: name.to_string(),
                    version: reached,
                    outcome: RegistrationOutcome::Upgraded {
                        from: record.version,
                        to: reached,
                    },
                    tables,
                }
            }
            Some(record) if record.version > version => {
                warn!(
                    "[database={}] recorded v{} is newer than declared v{}, not downgrading",
                    name, record.version, version
                );
                RegistrationReport {
                    database: name.to_string(),
                    version: record.version,
                    outcome: RegistrationOutcome::NewerOnDisk {
                        stored: record.version,
                    },
                    tables: PropagationReport::default(),
                }
            }
            Some(record) => {
                debug!("[database={}] already at v{}", name, record.version);
                RegistrationReport {
                    database: name.to_string(),
                    version: record.version,
                    outcome: RegistrationOutcome::Unchanged,
                    tables: PropagationReport::default(),
                }
            }
        };

        Ok(report)
    }

    fn record_tables(&self, database: &str, tables: &PropagationReport) -> RegistryResult<()> {
        let manager = self.manager();
        for outcome in &tables.tables {
            if let Some(version) = outcome.version {
                manager.set_table_version(database, &outcome.table, version)?;
            }
        }
        Ok(())
    }

    /// Descriptor registered under `name`
    pub fn lookup(&self, name: &str) -> Option<Arc<DatabaseDescriptor>> {
        self.descriptors.read().get(name).cloned()
    }

    /// Names of all registered databases, the manager included
    pub fn registered(&self) -> Vec<String> {
        let mut names: Vec<String> = self.descriptors.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Open connection for `name`, opening the physical file on first use
    ///
    /// A coarse lock only finds the per-name slot; the open itself happens
    /// under the slot's lock, so one name is opened at most once while other
    /// names open in parallel. Closed handles are replaced, never returned.
    pub fn open_or_create(&self, name: &str) -> RegistryResult<ConnectionHandle> {
        let descriptor = self
            .lookup(name)
            .ok_or_else(|| RegistryError::UnregisteredDatabase(name.to_string()))?;

        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(name.to_string()).or_default())
        };

        let mut guard = slot.lock();
        if let Some(handle) = guard.as_ref() {
            if handle.is_open() {
                return Ok(Arc::clone(handle));
            }
            debug!("evicting closed handle for {}", name);
        }

        let handle = Arc::new(self.open_physical(&descriptor)?);
        *guard = Some(Arc::clone(&handle));
        Ok(handle)
    }

    fn open_physical(&self, descriptor: &DatabaseDescriptor) -> RegistryResult<DatabaseConn> {
        let path = descriptor.path();
        let unavailable = |reason: String| RegistryError::StorageUnavailable {
            name: descriptor.name().to_string(),
            path: path.clone(),
            reason,
        };

        std::fs::create_dir_all(descriptor.directory()).map_err(|e| {
            unavailable(format!(
                "cannot create directory {}: {}",
                descriptor.directory().display(),
                e
            ))
        })?;
        let conn = DatabaseConn::open(&path).map_err(|e| unavailable(e.to_string()))?;

        self.physical_opens.fetch_add(1, Ordering::SeqCst);
        debug!("opened {} at {}", descriptor.name(), path.display());
        Ok(conn)
    }

    /// Number of physical opens performed so far
    pub fn physical_opens(&self) -> usize {
        self.physical_opens.load(Ordering::SeqCst)
    }

    /// Close the cached handle for `name`; the next access reopens it
    ///
    /// The slot stays in the map so that a caller already waiting on it
    /// reopens into the same slot everyone else sees.
    pub fn close(&self, name: &str) -> RegistryResult<()> {
        let slot = self.slots.lock().get(name).cloned();
        if let Some(slot) = slot {
            let taken = slot.lock().take();
            if let Some(handle) = taken {
                handle.close()?;
            }
        }
        Ok(())
    }

    /// Close every cached handle
    pub fn close_all(&self) -> RegistryResult<()> {
        let names: Vec<String> = self.slots.lock().keys().cloned().collect();
        for name in names {
            self.close(&name)?;
        }
        Ok(())
    }

    /// CRUD access to `table` of `database`
    pub fn table(&self, database: &str, table: &str) -> RegistryResult<Table<'_>> {
        let descriptor = self
            .lookup(database)
            .ok_or_else(|| RegistryError::UnregisteredDatabase(database.to_string()))?;
        if descriptor.table(table).is_none() {
            return Err(RegistryError::UnknownTable {
                database: database.to_string(),
                table: table.to_string(),
            });
        }
        Ok(Table::new(self, database, table))
    }

    /// The manager's version records
    pub fn manager(&self) -> ManagerTable<'_> {
        ManagerTable::new(self)
    }

    /// Outcome of the registration of `name`
    pub fn report(&self, name: &str) -> Option<RegistrationReport> {
        self.reports.read().get(name).cloned()
    }

    /// Descriptors rejected while building the registry
    pub fn failures(&self) -> Vec<RegistrationFailure> {
        self.failures.lock().clone()
    }
}

/// Startup configuration of a [`Registry`]
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    directory: Option<PathBuf>,
    databases: Vec<DatabaseDescriptor>,
}

impl RegistryBuilder {
    /// Directory of the manager database (defaults to the configured data directory)
    pub fn configure_directory(mut self, directory: impl AsRef<Path>) -> Self {
        self.directory = Some(directory.as_ref().to_path_buf());
        self
    }

    pub fn configure_database(mut self, descriptor: DatabaseDescriptor) -> Self {
        self.databases.push(descriptor);
        self
    }

    pub fn configure_databases(
        mut self,
        descriptors: impl IntoIterator<Item = DatabaseDescriptor>,
    ) -> Self {
        self.databases.extend(descriptors);
        self
    }

    /// Bootstrap the manager, then register every configured database
    ///
    /// Only a manager failure is fatal. Other failures are logged, listed in
    /// [`Registry::failures`] and leave the database unregistered.
    pub fn build(self) -> RegistryResult<Registry> {
        let directory = self
            .directory
            .unwrap_or_else(|| PathBuf::from(default_data_dir()));
        let registry = Registry::new(directory);
        registry.bootstrap()?;

        for descriptor in self.databases {
            let name = descriptor.name().to_string();
            if let Err(e) = registry.register(descriptor) {
                warn!("skipping database {}: {}", name, e);
                registry.failures.lock().push(RegistrationFailure {
                    database: name,
                    error: e.to_string(),
                });
            }
        }

        Ok(registry)
    }
}
