//! Backstore Lifecycle
//!
//! Creation and deletion of backstores for every kind, one storage object per
//! backend:
//! - **pscsi**: pass-through to a SCSI device
//! - **rd_dr / rd_mcp**: ram disks
//! - **fileio**: regular files (created on demand) or devices via the VFS
//! - **iblock**: block devices
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Backend Manager                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌──────────────┐  ┌─────────────────────────┐ │
//! │  │   Naming    │  │    Params    │  │    Index Allocator      │ │
//! │  │ (conflicts) │  │ (validation) │  │  (lowest free index)    │ │
//! │  └─────────────┘  └──────┬───────┘  └─────────────────────────┘ │
//! │                          │                                       │
//! │                  ┌───────┴────────┐                              │
//! │                  │  Fileio/Probe  │                              │
//! │                  └────────────────┘                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │              BackstoreDriver (memory | configfs)                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod fileio;
pub mod group;
pub mod index;
pub mod manager;
pub mod metrics;
pub mod naming;
pub mod params;
pub mod size;
pub mod view;

// Re-export main types
pub use fileio::{allocate_file, FillMode, SysfsProbe};
pub use group::{legacy_root_summary, BackendSummary, BackstoreGroup};
pub use index::{lowest_free_index, IndexAllocator, DEFAULT_INDEX_BOUND};
pub use manager::{
    BackendDeleteOutcome, BackendManager, CreateOutcome, DeleteOutcome, ManagerConfig, PluginVersion,
};
pub use metrics::BackstoreMetrics;
pub use naming::{assert_available, display_name, display_names, reserved_names};
pub use params::{
    BlockRequest, CreateDefaults, FileIoRequest, Notice, PscsiRequest, RamDiskRequest,
};
pub use size::{format_size, parse_size, SizeInput};
pub use view::StorageObjectView;
