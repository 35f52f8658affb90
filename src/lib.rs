//! Backstore Manager - SCSI Target Backstore Lifecycle
//!
//! Creates, lists and deletes the storage backends of a SCSI target
//! subsystem: pass-through devices, ram disks, file-backed and block-backed
//! storage objects. Every storage object gets a backend of its own; the
//! backend index is allocated automatically and released again when the
//! object is deleted.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                       backstore-manager CLI                          │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                          Backend Manager                             │
//! │  ┌────────────┐  ┌─────────────┐  ┌────────────┐  ┌──────────────┐  │
//! │  │   Sizes    │  │   Naming    │  │  Indexes   │  │  Views and   │  │
//! │  │ (parse/fmt)│  │ (conflicts) │  │ (lowest    │  │  Groups      │  │
//! │  │            │  │             │  │  free)     │  │              │  │
//! │  └────────────┘  └─────────────┘  └────────────┘  └──────────────┘  │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │        BackstoreDriver port          │        DeviceProbe port       │
//! │  ┌──────────────┐ ┌───────────────┐  │  ┌─────────────────────────┐  │
//! │  │    Memory    │ │   Configfs    │  │  │  stat + /sys/class/block │  │
//! │  └──────────────┘ └───────────────┘  │  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`backstore`]: Lifecycle manager, sizes, naming, indexes and views
//! - [`driver`]: Memory and configfs implementations of the driver port
//! - [`config`]: YAML configuration
//! - [`domain`]: Core domain types and traits
//! - [`error`]: Error types and handling

pub mod backstore;
pub mod config;
pub mod domain;
pub mod driver;
pub mod error;

// Re-export commonly used types
pub use backstore::{
    format_size, parse_size, BackendDeleteOutcome, BackendManager, BackendSummary, BackstoreGroup,
    BackstoreMetrics, BlockRequest, CreateDefaults, CreateOutcome, DeleteOutcome, FileIoRequest,
    ManagerConfig, Notice, PluginVersion, PscsiRequest, RamDiskRequest, SizeInput,
    StorageObjectView, SysfsProbe,
};

pub use config::Config;

pub use domain::ports::{
    BackendRef, BackstoreDriver, BackstoreDriverRef, BackstoreKind, DeviceProbe, DeviceProbeRef,
    PathKind, StorageObjectHandle, StorageObjectInfo, StorageObjectParams,
};

pub use driver::{ConfigfsConfig, ConfigfsDriver, DriverFactory, DriverKind, MemoryDriver};

pub use error::{Error, ErrorCategory, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
