//! Backend Manager
//!
//! Creates and deletes (backend, storage object) pairs for every backstore
//! kind. Each storage object gets a backend of its own. Creation is made
//! atomic enough through explicit rollback: when the storage object cannot be
//! created, the backend created for it (and any backing file created for it)
//! is removed before the error is returned.

use super::fileio::{remove_allocated_file, DEFAULT_ZERO_FILL_CHUNK};
use super::group::{BackendSummary, BackstoreGroup};
use super::index::{IndexAllocator, DEFAULT_INDEX_BOUND};
use super::metrics::BackstoreMetrics;
use super::naming::{assert_available, reserved_names};
use super::params::{
    prepare_block, prepare_fileio, prepare_pscsi, prepare_ramdisk, BlockRequest, CreateDefaults,
    FileIoRequest, Notice, Prepared, PscsiRequest, RamDiskRequest,
};
use super::view::StorageObjectView;
use crate::domain::ports::{
    BackendRef, BackstoreDriverRef, BackstoreKind, DeviceProbeRef, StorageObjectInfo,
};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

// =============================================================================
// Manager Configuration
// =============================================================================

/// Configuration for the backend manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Exclusive upper bound on backend indexes
    pub max_backend_index: u32,
    /// Chunk size when zero-filling non-sparse backing files
    pub zero_fill_chunk_bytes: usize,
    /// Defaults for optional creation parameters
    pub defaults: CreateDefaults,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_backend_index: DEFAULT_INDEX_BOUND,
            zero_fill_chunk_bytes: DEFAULT_ZERO_FILL_CHUNK,
            defaults: CreateDefaults::default(),
        }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of a successful creation
#[derive(Debug, Clone, Serialize)]
pub struct CreateOutcome {
    /// The new storage object
    pub object: StorageObjectView,
    /// Advisories raised along the way
    pub notices: Vec<Notice>,
}

/// Result of a successful deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    /// Name the object was deleted by
    pub name: String,
    /// Backend the object lived on
    pub backend: BackendRef,
    /// Whether the backend was removed as well
    pub backend_removed: bool,
}

/// Result of deleting a backend together with its objects
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendDeleteOutcome {
    pub backend: BackendRef,
    /// Stored names of the objects removed with it
    pub objects_removed: Vec<String>,
}

/// Plugin version of a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginVersion {
    pub backend: BackendRef,
    /// As reported by the driver
    pub version: Option<String>,
}

impl std::fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Backstore plugin {} {}",
            self.backend.kind.plugin(),
            self.version.as_deref().unwrap_or("unknown")
        )
    }
}

// =============================================================================
// Backend Manager
// =============================================================================

/// Orchestrates backend and storage object lifecycles over a driver
pub struct BackendManager {
    driver: BackstoreDriverRef,
    probe: DeviceProbeRef,
    config: ManagerConfig,
    indexes: IndexAllocator,
    metrics: BackstoreMetrics,
    /// Serialises snapshot-then-mutate sequences within this process
    session: Mutex<()>,
}

impl BackendManager {
    /// Create a new manager
    pub fn new(
        driver: BackstoreDriverRef,
        probe: DeviceProbeRef,
        config: ManagerConfig,
    ) -> Result<Self> {
        Ok(Self {
            driver,
            probe,
            indexes: IndexAllocator::new(config.max_backend_index),
            config,
            metrics: BackstoreMetrics::new()?,
            session: Mutex::new(()),
        })
    }

    /// Get the driver
    pub fn driver(&self) -> &BackstoreDriverRef {
        &self.driver
    }

    /// Get the lifecycle metrics
    pub fn metrics(&self) -> &BackstoreMetrics {
        &self.metrics
    }

    // =========================================================================
    // Creation Entry Points
    // =========================================================================

    /// Create a pass-through storage object
    pub fn create_pscsi(&self, request: PscsiRequest) -> Result<CreateOutcome> {
        let outcome = self.create(BackstoreKind::Pscsi, &request.name, || {
            prepare_pscsi(self.probe.as_ref(), &request)
        })?;
        info!(
            "Created pscsi storage object {} using {}",
            request.name, request.device
        );
        Ok(outcome)
    }

    /// Create a direct-mapped ram disk storage object
    pub fn create_rd_dr(&self, request: RamDiskRequest) -> Result<CreateOutcome> {
        self.create_ramdisk(BackstoreKind::RdDr, request)
    }

    /// Create a multi-page ram disk storage object
    pub fn create_rd_mcp(&self, request: RamDiskRequest) -> Result<CreateOutcome> {
        self.create_ramdisk(BackstoreKind::RdMcp, request)
    }

    fn create_ramdisk(&self, kind: BackstoreKind, request: RamDiskRequest) -> Result<CreateOutcome> {
        let outcome = self.create(kind, &request.name, || {
            prepare_ramdisk(&request, &self.config.defaults)
        })?;
        info!(
            "Created {} ramdisk {} with size {}",
            kind, request.name, request.size
        );
        Ok(outcome)
    }

    /// Create a file-backed storage object
    pub fn create_fileio(&self, request: FileIoRequest) -> Result<CreateOutcome> {
        let outcome = self.create(BackstoreKind::FileIo, &request.name, || {
            prepare_fileio(
                self.probe.as_ref(),
                &request,
                &self.config.defaults,
                self.config.zero_fill_chunk_bytes,
            )
        })?;
        info!(
            "Created fileio storage object {} using {}",
            request.name, request.file_or_dev
        );
        Ok(outcome)
    }

    /// Create a block-backed storage object
    pub fn create_block(&self, request: BlockRequest) -> Result<CreateOutcome> {
        let outcome = self.create(BackstoreKind::Block, &request.name, || {
            prepare_block(self.probe.as_ref(), &request, &self.config.defaults)
        })?;
        info!(
            "Created block storage object {} using {}",
            request.name, request.device
        );
        Ok(outcome)
    }

    // =========================================================================
    // Creation Protocol
    // =========================================================================

    /// Shared creation protocol for all kinds
    fn create<F>(&self, kind: BackstoreKind, name: &str, prepare: F) -> Result<CreateOutcome>
    where
        F: FnOnce() -> Result<Prepared>,
    {
        let _session = self.session.lock();

        let result = self.try_create(kind, name, prepare);
        if result.is_err() {
            self.metrics.record_create_failure(kind);
        }
        result
    }

    fn try_create<F>(&self, kind: BackstoreKind, name: &str, prepare: F) -> Result<CreateOutcome>
    where
        F: FnOnce() -> Result<Prepared>,
    {
        // 1. Reject names taken by siblings of the same kind
        let objects = self.driver.list_storage_objects()?;
        let reserved = reserved_names(kind, &objects);
        assert_available(kind, name, reserved.iter().map(String::as_str))?;

        // Kind-specific validation, may create a backing file
        let prepared = prepare()?;

        match self.create_pair(kind, name, &prepared) {
            Ok(object) => {
                self.metrics.record_created(kind);
                let all = self.driver.list_storage_objects().unwrap_or_else(|e| {
                    warn!("Failed to refresh storage objects after creating {}: {}", name, e);
                    vec![object.clone()]
                });
                Ok(CreateOutcome {
                    object: StorageObjectView::new(object, &all),
                    notices: prepared.notices,
                })
            }
            Err(e) => {
                if let Some(path) = &prepared.created_file {
                    info!("Removing backing file {} created for {}", path.display(), name);
                    remove_allocated_file(path);
                }
                Err(e)
            }
        }
    }

    /// Steps 2-5: allocate an index, create the backend, create the object
    fn create_pair(
        &self,
        kind: BackstoreKind,
        name: &str,
        prepared: &Prepared,
    ) -> Result<StorageObjectInfo> {
        let index = self.indexes.next_index(self.driver.as_ref(), kind)?;

        let backend = self.driver.create_backend(kind, index)?;
        debug!("Created backend {} for storage object {}", backend, name);

        match self
            .driver
            .create_storage_object(&backend, name, &prepared.params)
        {
            Ok(object) => Ok(object),
            Err(e) => {
                warn!(
                    "Creating storage object {} on {} failed, removing backend: {}",
                    name, backend, e
                );
                self.metrics.record_rollback(kind);
                if let Err(rollback) = self.driver.delete_backend(&backend) {
                    error!("Failed to remove backend {} during rollback: {}", backend, rollback);
                }
                Err(e)
            }
        }
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Delete a storage object by its display name, and its backend if emptied
    pub fn delete(&self, kind: BackstoreKind, name: &str) -> Result<DeleteOutcome> {
        let _session = self.session.lock();

        let objects = self.driver.list_storage_objects()?;
        let view = StorageObjectView::for_kind(kind, &objects)
            .into_iter()
            .find(|view| view.name == name)
            .ok_or_else(|| Error::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            })?;

        let backend = view.backend();
        self.driver.delete_storage_object(&view.object.handle())?;

        // The object is gone; backend cleanup failures are only logged
        let backend_removed = match self.driver.list_storage_objects() {
            Ok(remaining) if remaining.iter().any(|object| object.backend() == backend) => false,
            Ok(_) => match self.driver.delete_backend(&backend) {
                Ok(()) => {
                    debug!("Removed empty backend {}", backend);
                    true
                }
                Err(e) => {
                    warn!("Failed to remove empty backend {}: {}", backend, e);
                    false
                }
            },
            Err(e) => {
                warn!("Failed to list storage objects after deleting {}: {}", name, e);
                false
            }
        };

        self.metrics.record_deleted(kind, backend_removed);
        info!("Deleted storage object {}", name);

        Ok(DeleteOutcome {
            name: name.to_string(),
            backend,
            backend_removed,
        })
    }

    /// Delete a backend by its legacy name (e.g. `fileio_4`) with every
    /// storage object on it
    pub fn delete_backend(&self, name: &str) -> Result<BackendDeleteOutcome> {
        let _session = self.session.lock();

        let backend = self.find_backend(name)?;
        let mut objects_removed = Vec::new();
        for object in self.driver.list_storage_objects()? {
            if object.backend() != backend {
                continue;
            }
            self.driver.delete_storage_object(&object.handle())?;
            self.metrics.record_deleted(backend.kind, false);
            debug!("Deleted storage object {} on {}", object.name, backend);
            objects_removed.push(object.name);
        }

        self.driver.delete_backend(&backend)?;
        self.metrics.record_backend_deleted(backend.kind);
        info!(
            "Deleted backstore {} with {} storage object(s)",
            backend,
            objects_removed.len()
        );

        Ok(BackendDeleteOutcome {
            backend,
            objects_removed,
        })
    }

    fn find_backend(&self, name: &str) -> Result<BackendRef> {
        self.driver
            .list_backends()?
            .into_iter()
            .find(|backend| backend.name() == name)
            .ok_or_else(|| Error::NotFound {
                kind: "backstore".to_string(),
                name: name.to_string(),
            })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Views of all storage objects of a kind
    pub fn list(&self, kind: BackstoreKind) -> Result<Vec<StorageObjectView>> {
        let objects = self.driver.list_storage_objects()?;
        Ok(StorageObjectView::for_kind(kind, &objects))
    }

    /// Container node for a kind
    pub fn group(&self, kind: BackstoreKind) -> Result<BackstoreGroup> {
        Ok(BackstoreGroup::new(kind, self.list(kind)?))
    }

    /// Container nodes for every kind
    pub fn groups(&self) -> Result<Vec<BackstoreGroup>> {
        let objects = self.driver.list_storage_objects()?;
        Ok(BackstoreKind::ALL
            .iter()
            .map(|&kind| BackstoreGroup::new(kind, StorageObjectView::for_kind(kind, &objects)))
            .collect())
    }

    /// Names of storage objects of `kind` starting with `prefix`
    ///
    /// A single match is returned with a trailing space so a shell can move
    /// on to the next argument.
    pub fn completions(&self, kind: BackstoreKind, prefix: &str) -> Result<Vec<String>> {
        let names = self.list(kind)?.into_iter().map(|view| view.name);
        Ok(complete(names, prefix))
    }

    /// Legacy backend names starting with `prefix`, completed like
    /// [`completions`](Self::completions)
    pub fn backend_completions(&self, prefix: &str) -> Result<Vec<String>> {
        let names = self.driver.list_backends()?.into_iter().map(|backend| backend.name());
        Ok(complete(names, prefix))
    }

    /// One entry per live backend, the legacy per-backend view
    pub fn legacy_backends(&self) -> Result<Vec<BackendSummary>> {
        let backends = self.driver.list_backends()?;
        let objects = self.driver.list_storage_objects()?;
        Ok(BackendSummary::collect(&backends, &objects))
    }

    /// Plugin version of a backend given by its legacy name
    pub fn plugin_version(&self, backend_name: &str) -> Result<PluginVersion> {
        let backend = self.find_backend(backend_name)?;
        self.version_of(backend)
    }

    /// Plugin version of the backend holding a storage object
    pub fn object_plugin_version(&self, kind: BackstoreKind, name: &str) -> Result<PluginVersion> {
        let backend = self
            .list(kind)?
            .into_iter()
            .find(|view| view.name == name)
            .map(|view| view.backend())
            .ok_or_else(|| Error::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            })?;
        self.version_of(backend)
    }

    fn version_of(&self, backend: BackendRef) -> Result<PluginVersion> {
        Ok(PluginVersion {
            backend,
            version: self.driver.plugin_version(&backend)?,
        })
    }
}

/// Sorted names starting with `prefix`; a single match gets a trailing space
fn complete(names: impl Iterator<Item = String>, prefix: &str) -> Vec<String> {
    let mut completions: Vec<String> = names.filter(|name| name.starts_with(prefix)).collect();
    completions.sort();

    if let [only] = completions.as_mut_slice() {
        only.push(' ');
    }
    completions
}
