//! Storage Object View
//!
//! Human-facing status for a storage object, derived from its live driver
//! attributes and those of its siblings.

use super::naming::display_name;
use super::size::format_size;
use crate::domain::ports::{BackendRef, BackstoreKind, StorageObjectInfo};
use serde::Serialize;

const BROKEN_LINK: &str = "BROKEN STORAGE LINK";
const ADDED_SUFFIX: &str = "ADDED SUFFIX";
const SHARED_HBA: &str = "SHARED HBA";

/// A storage object as presented to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageObjectView {
    /// Externally visible label
    pub name: String,
    /// Live driver attributes
    pub object: StorageObjectInfo,
    /// Number of storage objects on the owning backend
    pub backend_objects: usize,
}

impl StorageObjectView {
    /// Build the view of `object` given every object the driver reports
    pub fn new(object: StorageObjectInfo, all_objects: &[StorageObjectInfo]) -> Self {
        let backend = object.backend();
        let backend_objects = all_objects
            .iter()
            .filter(|other| other.backend() == backend)
            .count()
            .max(1);

        Self {
            name: display_name(&object, all_objects),
            object,
            backend_objects,
        }
    }

    /// Views for every object of `kind`, in driver order
    pub fn for_kind(kind: BackstoreKind, all_objects: &[StorageObjectInfo]) -> Vec<Self> {
        all_objects
            .iter()
            .filter(|object| object.kind == kind)
            .map(|object| Self::new(object.clone(), all_objects))
            .collect()
    }

    /// Stored name as the driver knows it
    pub fn stored_name(&self) -> &str {
        &self.object.name
    }

    /// Owning backend
    pub fn backend(&self) -> BackendRef {
        self.object.backend()
    }

    /// Path shown to the user: "ramdisk" for memory kinds
    pub fn display_path(&self) -> Option<&str> {
        if self.object.kind.is_ramdisk() {
            return Some("ramdisk");
        }
        self.object.path.as_deref().filter(|path| !path.is_empty())
    }

    /// Legacy markers for this object
    pub fn legacy_markers(&self) -> Vec<&'static str> {
        let mut legacy = Vec::new();
        if self.name != self.object.name {
            legacy.push(ADDED_SUFFIX);
        }
        if self.backend_objects > 1 {
            legacy.push(SHARED_HBA);
        }
        legacy
    }

    /// Summary text and health flag
    pub fn summary(&self) -> (String, bool) {
        let path = self.display_path();
        let status = &self.object.status;

        let mut errors = Vec::new();
        if path.is_none() {
            errors.push(BROKEN_LINK.to_string());
        }

        let legacy = self.legacy_markers();
        if !legacy.is_empty() {
            errors.push(format!("LEGACY: {}", legacy.join(", ")));
        }

        if !errors.is_empty() {
            let mut msg = errors.join(", ");
            if let Some(path) = path {
                msg.push_str(&format!(" ({} {})", path, status));
            }
            return (msg, false);
        }

        let path = path.unwrap_or_default();
        let msg = match self.object.size_bytes {
            Some(size) => format!("{} ({}) {}", path, format_size(size), status),
            None => format!("{} {}", path, status),
        };
        (msg, true)
    }
}
