//! Backend Index Allocation
//!
//! Finds the lowest backend index not used by any live backend of a kind.

use crate::domain::ports::{BackstoreDriver, BackstoreKind};
use crate::error::{Error, Result};
use std::collections::BTreeSet;
use tracing::debug;

/// Default exclusive upper bound on backend indexes
pub const DEFAULT_INDEX_BOUND: u32 = 1_048_576;

/// Allocates backend indexes from a fresh driver snapshot
#[derive(Debug, Clone, Copy)]
pub struct IndexAllocator {
    bound: u32,
}

impl Default for IndexAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_INDEX_BOUND)
    }
}

impl IndexAllocator {
    /// Create an allocator scanning `0..bound`
    pub fn new(bound: u32) -> Self {
        Self { bound }
    }

    /// Exclusive upper bound
    pub fn bound(&self) -> u32 {
        self.bound
    }

    /// Return the lowest index not used by a live backend of `kind`
    pub fn next_index(&self, driver: &dyn BackstoreDriver, kind: BackstoreKind) -> Result<u32> {
        let backends = driver.list_backends()?;
        let used: BTreeSet<u32> = backends
            .iter()
            .filter(|backend| backend.kind == kind)
            .map(|backend| backend.index)
            .collect();

        debug!("Existing {} backstore indexes: {:?}", kind, used);

        let index = lowest_free_index(&used, self.bound).ok_or_else(|| Error::NoAvailableIndex {
            kind: kind.to_string(),
            bound: self.bound,
        })?;

        debug!("First available {} backstore index is {}", kind, index);
        Ok(index)
    }
}

/// Smallest non-negative integer below `bound` missing from `used`
pub fn lowest_free_index(used: &BTreeSet<u32>, bound: u32) -> Option<u32> {
    // `used` is sorted: the first gap in 0, 1, 2, ... is the answer
    let mut candidate = 0u32;
    for &index in used.range(..bound) {
        if index != candidate {
            break;
        }
        candidate += 1;
    }

    (candidate < bound).then_some(candidate)
}
