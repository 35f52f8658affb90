//! Storage Object Naming
//!
//! Name availability checks and the display-name deduplication applied to
//! legacy configurations, where several storage objects of one kind share a
//! literal name across backends. Deduplication only changes the label shown
//! to the user; the stored name is never touched.

use crate::domain::ports::{BackstoreKind, StorageObjectInfo};
use crate::error::{Error, Result};
use std::collections::{BTreeSet, HashMap};

/// Fail with `NameConflict` if `proposed` is among `existing`
pub fn assert_available<'a, I>(kind: BackstoreKind, proposed: &str, existing: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    if existing.into_iter().any(|name| name == proposed) {
        return Err(Error::NameConflict {
            kind: kind.to_string(),
            name: proposed.to_string(),
        });
    }
    Ok(())
}

/// Label for `object` among the objects of its kind
///
/// Returns the stored name unless another object in `siblings` of the same
/// kind carries the same literal name, in which case the owning backend's
/// index is appended.
pub fn display_name(object: &StorageObjectInfo, siblings: &[StorageObjectInfo]) -> String {
    let same_name = siblings
        .iter()
        .filter(|sibling| sibling.kind == object.kind && sibling.name == object.name)
        .count();

    if same_name > 1 {
        format!("{}_{}", object.name, object.backend_index)
    } else {
        object.name.clone()
    }
}

/// Labels for every object in `objects`, in the same order
pub fn display_names(objects: &[StorageObjectInfo]) -> Vec<String> {
    let mut counts: HashMap<(BackstoreKind, &str), usize> = HashMap::new();
    for object in objects {
        *counts.entry((object.kind, object.name.as_str())).or_default() += 1;
    }

    objects
        .iter()
        .map(|object| {
            if counts[&(object.kind, object.name.as_str())] > 1 {
                format!("{}_{}", object.name, object.backend_index)
            } else {
                object.name.clone()
            }
        })
        .collect()
}

/// Names a new object of `kind` must not take
///
/// Both stored names and display labels are reserved, so a legacy duplicate
/// cannot be extended by yet another object with the same stored name.
pub fn reserved_names(kind: BackstoreKind, objects: &[StorageObjectInfo]) -> BTreeSet<String> {
    let of_kind: Vec<StorageObjectInfo> = objects
        .iter()
        .filter(|object| object.kind == kind)
        .cloned()
        .collect();

    of_kind
        .iter()
        .map(|object| object.name.clone())
        .chain(display_names(&of_kind))
        .collect()
}
