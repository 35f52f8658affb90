//! Container Nodes
//!
//! Per-kind groups of storage objects, and the legacy per-backend listing
//! where every live backend is shown with the objects it owns.

use super::view::StorageObjectView;
use crate::domain::ports::{BackendRef, BackstoreKind, StorageObjectInfo};
use serde::Serialize;

fn count_label(count: usize, singular: &str, plural: &str) -> String {
    if count > 1 {
        format!("{} {}", count, plural)
    } else {
        format!("{} {}", count, singular)
    }
}

/// All storage objects of one kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackstoreGroup {
    pub kind: BackstoreKind,
    pub objects: Vec<StorageObjectView>,
}

impl BackstoreGroup {
    pub fn new(kind: BackstoreKind, objects: Vec<StorageObjectView>) -> Self {
        Self { kind, objects }
    }

    /// Object count; groups carry no health flag
    pub fn summary(&self) -> (String, Option<bool>) {
        (
            count_label(self.objects.len(), "Storage Object", "Storage Objects"),
            None,
        )
    }
}

/// One backend in the legacy listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendSummary {
    /// Backend name, e.g. `fileio_0`
    pub name: String,
    pub kind: BackstoreKind,
    pub index: u32,
    /// Stored names of the objects on this backend
    pub object_names: Vec<String>,
}

impl BackendSummary {
    /// One summary per backend, in driver order
    pub fn collect(backends: &[BackendRef], objects: &[StorageObjectInfo]) -> Vec<Self> {
        backends
            .iter()
            .map(|backend| Self {
                name: backend.name(),
                kind: backend.kind,
                index: backend.index,
                object_names: objects
                    .iter()
                    .filter(|object| object.backend() == *backend)
                    .map(|object| object.name.clone())
                    .collect(),
            })
            .collect()
    }

    pub fn summary(&self) -> (String, Option<bool>) {
        (
            count_label(self.object_names.len(), "Storage Object", "Storage Objects"),
            None,
        )
    }
}

/// Summary line for the legacy listing root
pub fn legacy_root_summary(backends: &[BackendSummary]) -> (String, Option<bool>) {
    (
        format!(
            "{} (legacy mode)",
            count_label(backends.len(), "Backstore", "Backstores")
        ),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(kind: BackstoreKind, name: &str, index: u32) -> StorageObjectInfo {
        StorageObjectInfo {
            name: name.to_string(),
            kind,
            backend_index: index,
            path: Some(format!("/srv/{}.img", name)),
            size_bytes: Some(4096),
            status: "activated".to_string(),
            wwn_generated: true,
            buffered: Some(true),
        }
    }

    #[test]
    fn test_group_summary() {
        let group = BackstoreGroup::new(BackstoreKind::FileIo, vec![]);
        assert_eq!(group.summary(), ("0 Storage Object".to_string(), None));

        let all = vec![object(BackstoreKind::FileIo, "a", 0)];
        let group = BackstoreGroup::new(
            BackstoreKind::FileIo,
            StorageObjectView::for_kind(BackstoreKind::FileIo, &all),
        );
        assert_eq!(group.summary().0, "1 Storage Object");
    }

    #[test]
    fn test_backend_summaries() {
        let backends = vec![
            BackendRef::new(BackstoreKind::FileIo, 0),
            BackendRef::new(BackstoreKind::FileIo, 1),
            BackendRef::new(BackstoreKind::Block, 0),
        ];
        let objects = vec![
            object(BackstoreKind::FileIo, "a", 0),
            object(BackstoreKind::FileIo, "b", 0),
            object(BackstoreKind::Block, "c", 0),
        ];

        let summaries = BackendSummary::collect(&backends, &objects);
        assert_eq!(summaries[0].name, "fileio_0");
        assert_eq!(summaries[0].object_names, vec!["a", "b"]);
        assert_eq!(summaries[0].summary().0, "2 Storage Objects");
        assert!(summaries[1].object_names.is_empty());
        assert_eq!(summaries[2].name, "iblock_0");
        assert_eq!(summaries[2].object_names, vec!["c"]);

        assert_eq!(
            legacy_root_summary(&summaries).0,
            "3 Backstores (legacy mode)"
        );
    }
}
