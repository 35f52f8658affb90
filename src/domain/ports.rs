//! Domain Ports - Core trait definitions for the backstore manager
//!
//! These traits define the boundaries between the lifecycle logic and the
//! kernel-facing resource driver. Adapters in [`crate::driver`] implement them.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

// =============================================================================
// Backstore Kinds
// =============================================================================

/// Backstore plugin kinds supported by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BackstoreKind {
    /// SCSI pass-through to a physical device
    #[serde(rename = "pscsi")]
    Pscsi,
    /// Ram disk with direct memory mapping
    #[serde(rename = "rd_dr")]
    RdDr,
    /// Ram disk with a separate multi-page memory copy
    #[serde(rename = "rd_mcp")]
    RdMcp,
    /// File or device served through the VFS
    #[serde(rename = "fileio", alias = "file_io")]
    FileIo,
    /// Block device served through the block layer
    #[serde(rename = "iblock", alias = "block")]
    Block,
}

impl BackstoreKind {
    /// All kinds, in the order they are presented
    pub const ALL: [BackstoreKind; 5] = [
        BackstoreKind::Pscsi,
        BackstoreKind::RdDr,
        BackstoreKind::RdMcp,
        BackstoreKind::FileIo,
        BackstoreKind::Block,
    ];

    /// Kernel plugin name
    pub fn plugin(&self) -> &'static str {
        match self {
            BackstoreKind::Pscsi => "pscsi",
            BackstoreKind::RdDr => "rd_dr",
            BackstoreKind::RdMcp => "rd_mcp",
            BackstoreKind::FileIo => "fileio",
            BackstoreKind::Block => "iblock",
        }
    }

    /// Whether objects of this kind live in memory
    pub fn is_ramdisk(&self) -> bool {
        matches!(self, BackstoreKind::RdDr | BackstoreKind::RdMcp)
    }
}

impl std::fmt::Display for BackstoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.plugin())
    }
}

impl FromStr for BackstoreKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pscsi" => Ok(BackstoreKind::Pscsi),
            "rd_dr" | "rd-dr" => Ok(BackstoreKind::RdDr),
            "rd_mcp" | "rd-mcp" | "ramdisk" => Ok(BackstoreKind::RdMcp),
            "fileio" | "file_io" => Ok(BackstoreKind::FileIo),
            "iblock" | "block" => Ok(BackstoreKind::Block),
            _ => Err(Error::InvalidKind(s.to_string())),
        }
    }
}

// =============================================================================
// Backends and Storage Objects
// =============================================================================

/// Handle to one backend instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BackendRef {
    /// Plugin kind
    pub kind: BackstoreKind,
    /// Index, unique per kind
    pub index: u32,
}

impl BackendRef {
    pub fn new(kind: BackstoreKind, index: u32) -> Self {
        Self { kind, index }
    }

    /// Backend name as shown in the legacy view (e.g. `fileio_0`)
    pub fn name(&self) -> String {
        format!("{}_{}", self.kind.plugin(), self.index)
    }
}

impl std::fmt::Display for BackendRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.kind.plugin(), self.index)
    }
}

/// Live attributes of a storage object as reported by the driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageObjectInfo {
    /// Stored name
    pub name: String,
    /// Kind of the owning backend
    pub kind: BackstoreKind,
    /// Index of the owning backend
    pub backend_index: u32,
    /// Backing device or file path, if linked
    pub path: Option<String>,
    /// Size in bytes, if known
    pub size_bytes: Option<u64>,
    /// Health status string reported by the driver
    pub status: String,
    /// Whether a unit serial was generated
    pub wwn_generated: bool,
    /// Buffered mode (file-backed only)
    pub buffered: Option<bool>,
}

impl StorageObjectInfo {
    /// Owning backend
    pub fn backend(&self) -> BackendRef {
        BackendRef::new(self.kind, self.backend_index)
    }

    /// Handle used to delete this object
    pub fn handle(&self) -> StorageObjectHandle {
        StorageObjectHandle {
            backend: self.backend(),
            name: self.name.clone(),
        }
    }
}

/// Handle to one storage object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageObjectHandle {
    pub backend: BackendRef,
    pub name: String,
}

/// Kind-specific parameters passed to the driver when creating an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageObjectParams {
    /// Device path or `H:C:T:L` address
    Pscsi { device: String },
    /// Ram disk of either flavour
    RamDisk { size_bytes: u64, generate_wwn: bool },
    /// File or device served through the VFS
    FileIo {
        path: String,
        size_bytes: Option<u64>,
        generate_wwn: bool,
        buffered: bool,
    },
    /// Block device
    Block { device: String, generate_wwn: bool },
}

impl StorageObjectParams {
    /// Backing path, where the parameters carry one
    pub fn path(&self) -> Option<&str> {
        match self {
            StorageObjectParams::Pscsi { device } => Some(device),
            StorageObjectParams::RamDisk { .. } => None,
            StorageObjectParams::FileIo { path, .. } => Some(path),
            StorageObjectParams::Block { device, .. } => Some(device),
        }
    }
}

// =============================================================================
// Backstore Driver Port
// =============================================================================

/// Port for the kernel-level resource driver
///
/// All calls are synchronous. Listing calls return a fresh snapshot every
/// time; creation calls must reject an index or name that is already taken.
pub trait BackstoreDriver: Send + Sync {
    /// List all live backends
    fn list_backends(&self) -> Result<Vec<BackendRef>>;

    /// List all live storage objects
    fn list_storage_objects(&self) -> Result<Vec<StorageObjectInfo>>;

    /// Create a backend at the given index
    fn create_backend(&self, kind: BackstoreKind, index: u32) -> Result<BackendRef>;

    /// Delete a backend
    fn delete_backend(&self, backend: &BackendRef) -> Result<()>;

    /// Create a storage object on a backend
    fn create_storage_object(
        &self,
        backend: &BackendRef,
        name: &str,
        params: &StorageObjectParams,
    ) -> Result<StorageObjectInfo>;

    /// Delete a storage object
    fn delete_storage_object(&self, handle: &StorageObjectHandle) -> Result<()>;

    /// Version the kernel reports for a backend's plugin, if it reports one
    fn plugin_version(&self, _backend: &BackendRef) -> Result<Option<String>> {
        Ok(None)
    }

    /// Get driver name
    fn name(&self) -> &str;
}

// =============================================================================
// Device Probe Port
// =============================================================================

/// What a path on the host refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// Nothing exists at the path
    Missing,
    /// Regular file of the given length
    RegularFile { len: u64 },
    /// Whole-disk block device
    BlockDevice,
    /// Disk partition
    Partition,
    /// Directory, socket, character device...
    Other,
}

impl PathKind {
    /// Block device or partition
    pub fn is_device(&self) -> bool {
        matches!(self, PathKind::BlockDevice | PathKind::Partition)
    }
}

/// Port for inspecting host paths
pub trait DeviceProbe: Send + Sync {
    /// Classify a path
    fn classify(&self, path: &Path) -> Result<PathKind>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type BackstoreDriverRef = Arc<dyn BackstoreDriver>;
pub type DeviceProbeRef = Arc<dyn DeviceProbe>;
