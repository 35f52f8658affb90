//! In-Memory Driver
//!
//! Keeps backends and storage objects in ordered maps behind a read-write
//! lock. Used for dry runs and as the driver in tests; failures can be
//! injected for the next backend creation, backend deletion or storage
//! object creation.

use crate::domain::ports::{
    BackendRef, BackstoreDriver, BackstoreKind, StorageObjectHandle, StorageObjectInfo,
    StorageObjectParams,
};
use crate::error::{Error, Result};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

const STATUS_ACTIVATED: &str = "activated";

type ObjectMap = IndexMap<String, StorageObjectInfo>;

/// Driver state held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryDriver {
    /// Backends in creation order, each with its objects
    backends: RwLock<IndexMap<BackendRef, ObjectMap>>,
    /// Reason for failing the next `create_backend`
    fail_backend: Mutex<Option<String>>,
    /// Reason for failing the next `delete_backend`
    fail_backend_delete: Mutex<Option<String>>,
    /// Reason for failing the next `create_storage_object`
    fail_storage_object: Mutex<Option<String>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next backend creation with `reason`
    pub fn fail_next_backend(&self, reason: impl Into<String>) {
        *self.fail_backend.lock() = Some(reason.into());
    }

    /// Fail the next backend deletion with `reason`
    pub fn fail_next_backend_delete(&self, reason: impl Into<String>) {
        *self.fail_backend_delete.lock() = Some(reason.into());
    }

    /// Fail the next storage object creation with `reason`
    pub fn fail_next_storage_object(&self, reason: impl Into<String>) {
        *self.fail_storage_object.lock() = Some(reason.into());
    }

    /// Number of live backends
    pub fn backend_count(&self) -> usize {
        self.backends.read().len()
    }

    fn object_info(
        backend: &BackendRef,
        name: &str,
        params: &StorageObjectParams,
    ) -> Result<StorageObjectInfo> {
        let mut info = StorageObjectInfo {
            name: name.to_string(),
            kind: backend.kind,
            backend_index: backend.index,
            path: params.path().map(String::from),
            size_bytes: None,
            status: STATUS_ACTIVATED.to_string(),
            wwn_generated: false,
            buffered: None,
        };

        match (backend.kind, params) {
            (BackstoreKind::Pscsi, StorageObjectParams::Pscsi { .. }) => {}
            (BackstoreKind::RdDr | BackstoreKind::RdMcp, StorageObjectParams::RamDisk {
                size_bytes,
                generate_wwn,
            }) => {
                info.size_bytes = Some(*size_bytes);
                info.wwn_generated = *generate_wwn;
            }
            (
                BackstoreKind::FileIo,
                StorageObjectParams::FileIo {
                    size_bytes,
                    generate_wwn,
                    buffered,
                    ..
                },
            ) => {
                info.size_bytes = *size_bytes;
                info.wwn_generated = *generate_wwn;
                info.buffered = Some(*buffered);
            }
            (BackstoreKind::Block, StorageObjectParams::Block { generate_wwn, .. }) => {
                info.wwn_generated = *generate_wwn;
            }
            (kind, params) => {
                return Err(Error::driver(
                    "create_storage_object",
                    format!("{:?} parameters do not apply to a {} backend", params, kind),
                ))
            }
        }

        Ok(info)
    }
}

impl BackstoreDriver for MemoryDriver {
    fn list_backends(&self) -> Result<Vec<BackendRef>> {
        Ok(self.backends.read().keys().copied().collect())
    }

    fn list_storage_objects(&self) -> Result<Vec<StorageObjectInfo>> {
        Ok(self
            .backends
            .read()
            .values()
            .flat_map(|objects| objects.values().cloned())
            .collect())
    }

    fn create_backend(&self, kind: BackstoreKind, index: u32) -> Result<BackendRef> {
        if let Some(reason) = self.fail_backend.lock().take() {
            return Err(Error::driver("create_backend", reason));
        }

        let backend = BackendRef::new(kind, index);
        let mut backends = self.backends.write();
        if backends.contains_key(&backend) {
            return Err(Error::driver(
                "create_backend",
                format!("backend {} already exists", backend),
            ));
        }

        backends.insert(backend, ObjectMap::new());
        debug!("Memory driver created backend {}", backend);
        Ok(backend)
    }

    fn delete_backend(&self, backend: &BackendRef) -> Result<()> {
        if let Some(reason) = self.fail_backend_delete.lock().take() {
            return Err(Error::driver("delete_backend", reason));
        }

        // shift_remove keeps the remaining backends in creation order
        match self.backends.write().shift_remove(backend) {
            Some(_) => {
                debug!("Memory driver deleted backend {}", backend);
                Ok(())
            }
            None => Err(Error::driver(
                "delete_backend",
                format!("backend {} does not exist", backend),
            )),
        }
    }

    fn create_storage_object(
        &self,
        backend: &BackendRef,
        name: &str,
        params: &StorageObjectParams,
    ) -> Result<StorageObjectInfo> {
        if let Some(reason) = self.fail_storage_object.lock().take() {
            return Err(Error::driver("create_storage_object", reason));
        }

        let info = Self::object_info(backend, name, params)?;

        let mut backends = self.backends.write();
        let objects = backends.get_mut(backend).ok_or_else(|| {
            Error::driver(
                "create_storage_object",
                format!("backend {} does not exist", backend),
            )
        })?;
        if objects.contains_key(name) {
            return Err(Error::driver(
                "create_storage_object",
                format!("{} already exists on backend {}", name, backend),
            ));
        }

        objects.insert(name.to_string(), info.clone());
        debug!("Memory driver created storage object {} on {}", name, backend);
        Ok(info)
    }

    fn delete_storage_object(&self, handle: &StorageObjectHandle) -> Result<()> {
        let mut backends = self.backends.write();
        let removed = backends
            .get_mut(&handle.backend)
            .and_then(|objects| objects.shift_remove(&handle.name));

        match removed {
            Some(_) => Ok(()),
            None => Err(Error::driver(
                "delete_storage_object",
                format!("{} does not exist on backend {}", handle.name, handle.backend),
            )),
        }
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn ramdisk() -> StorageObjectParams {
        StorageObjectParams::RamDisk {
            size_bytes: 4096,
            generate_wwn: true,
        }
    }

    #[test]
    fn test_backend_lifecycle() {
        let driver = MemoryDriver::new();

        let backend = driver.create_backend(BackstoreKind::RdMcp, 0).unwrap();
        assert_matches!(
            driver.create_backend(BackstoreKind::RdMcp, 0),
            Err(Error::Driver { .. })
        );
        // Same index under another kind is a different backend
        driver.create_backend(BackstoreKind::RdDr, 0).unwrap();
        assert_eq!(driver.backend_count(), 2);

        driver.delete_backend(&backend).unwrap();
        assert_matches!(driver.delete_backend(&backend), Err(Error::Driver { .. }));
        assert_eq!(
            driver.list_backends().unwrap(),
            vec![BackendRef::new(BackstoreKind::RdDr, 0)]
        );
    }

    #[test]
    fn test_storage_object_lifecycle() {
        let driver = MemoryDriver::new();
        let backend = driver.create_backend(BackstoreKind::RdMcp, 3).unwrap();

        let info = driver
            .create_storage_object(&backend, "rd", &ramdisk())
            .unwrap();
        assert_eq!(info.backend(), backend);
        assert_eq!(info.size_bytes, Some(4096));
        assert_eq!(info.status, "activated");

        assert_matches!(
            driver.create_storage_object(&backend, "rd", &ramdisk()),
            Err(Error::Driver { .. })
        );

        driver.delete_storage_object(&info.handle()).unwrap();
        assert!(driver.list_storage_objects().unwrap().is_empty());
        // Deleting an object leaves its backend alone
        assert_eq!(driver.backend_count(), 1);
    }

    #[test]
    fn test_rejects_missing_backend_and_wrong_params() {
        let driver = MemoryDriver::new();
        let missing = BackendRef::new(BackstoreKind::RdMcp, 0);
        assert_matches!(
            driver.create_storage_object(&missing, "rd", &ramdisk()),
            Err(Error::Driver { .. })
        );

        let fileio = driver.create_backend(BackstoreKind::FileIo, 0).unwrap();
        assert_matches!(
            driver.create_storage_object(&fileio, "rd", &ramdisk()),
            Err(Error::Driver { .. })
        );
    }

    #[test]
    fn test_injected_failures_fire_once() {
        let driver = MemoryDriver::new();

        driver.fail_next_backend("no memory");
        assert_matches!(
            driver.create_backend(BackstoreKind::Block, 0),
            Err(Error::Driver { reason, .. }) if reason == "no memory"
        );
        let backend = driver.create_backend(BackstoreKind::Block, 0).unwrap();

        let params = StorageObjectParams::Block {
            device: "/dev/sdb".into(),
            generate_wwn: false,
        };
        driver.fail_next_storage_object("busy");
        assert!(driver.create_storage_object(&backend, "b", &params).is_err());
        let info = driver.create_storage_object(&backend, "b", &params).unwrap();
        assert_eq!(info.path.as_deref(), Some("/dev/sdb"));
        assert!(!info.wwn_generated);

        driver.fail_next_backend_delete("busy");
        assert!(driver.delete_backend(&backend).is_err());
        assert_eq!(driver.backend_count(), 1);
        driver.delete_backend(&backend).unwrap();
        assert_eq!(driver.backend_count(), 0);
    }
}
