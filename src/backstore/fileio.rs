//! File-backed Storage Helpers
//!
//! Host path classification through the filesystem and sysfs, and the
//! allocation of new backing files for file-backed storage objects.

use crate::domain::ports::{DeviceProbe, PathKind};
use crate::error::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default chunk size when zero-filling a non-sparse file
pub const DEFAULT_ZERO_FILL_CHUNK: usize = 1024 * 1024;

// =============================================================================
// Sysfs Device Probe
// =============================================================================

/// Classifies host paths using `stat` and `/sys/class/block`
#[derive(Debug, Clone)]
pub struct SysfsProbe {
    /// Path to sysfs (for testing)
    sysfs_path: PathBuf,
}

impl Default for SysfsProbe {
    fn default() -> Self {
        Self::new("/sys")
    }
}

impl SysfsProbe {
    /// Create a probe reading sysfs below `sysfs_path`
    pub fn new(sysfs_path: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_path: sysfs_path.into(),
        }
    }

    /// Check if a block device is a partition
    fn is_partition(&self, device: &Path) -> bool {
        // Resolve /dev/disk/by-id style links to the kernel name
        let resolved = fs::canonicalize(device).unwrap_or_else(|_| device.to_path_buf());
        let Some(name) = resolved.file_name() else {
            return false;
        };

        // Partitions have a "partition" file
        self.sysfs_path
            .join("class/block")
            .join(name)
            .join("partition")
            .exists()
    }
}

impl DeviceProbe for SysfsProbe {
    fn classify(&self, path: &Path) -> Result<PathKind> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(PathKind::Missing),
            Err(e) => {
                return Err(Error::invalid_path(
                    path.display().to_string(),
                    e.to_string(),
                ))
            }
        };

        let file_type = metadata.file_type();
        let kind = if file_type.is_file() {
            PathKind::RegularFile {
                len: metadata.len(),
            }
        } else if file_type.is_block_device() {
            if self.is_partition(path) {
                PathKind::Partition
            } else {
                PathKind::BlockDevice
            }
        } else {
            PathKind::Other
        };

        debug!("Classified {} as {:?}", path.display(), kind);
        Ok(kind)
    }
}

// =============================================================================
// Backing File Allocation
// =============================================================================

/// How a new backing file is filled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMode {
    /// Extend without writing; the filesystem reads holes back as zeros
    Sparse,
    /// Write zeros in chunks of the given size
    ZeroFill { chunk_size: usize },
}

/// Create `path` and extend it to exactly `size_bytes`
///
/// The file must not exist yet. On any failure the partially written file is
/// removed before returning `FileAllocation`.
pub fn allocate_file(path: &Path, size_bytes: u64, mode: FillMode) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| allocation_error(path, e))?;

    if let Err(e) = fill(&file, size_bytes, mode) {
        drop(file);
        remove_allocated_file(path);
        return Err(allocation_error(path, e));
    }

    debug!(
        "Allocated {} bytes at {} ({:?})",
        size_bytes,
        path.display(),
        mode
    );
    Ok(())
}

/// Remove a file created by [`allocate_file`], logging failures
pub fn remove_allocated_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!("Failed to remove backing file {}: {}", path.display(), e);
    }
}

fn fill(mut file: &File, size_bytes: u64, mode: FillMode) -> io::Result<()> {
    match mode {
        FillMode::Sparse => file.set_len(size_bytes)?,
        FillMode::ZeroFill { chunk_size } => {
            let chunk_size = chunk_size.max(1);
            let buffer = vec![0u8; chunk_size];
            let mut remaining = size_bytes;

            while remaining > 0 {
                let n = remaining.min(chunk_size as u64) as usize;
                file.write_all(&buffer[..n])?;
                remaining -= n as u64;
            }
        }
    }

    file.sync_all()
}

fn allocation_error(path: &Path, e: io::Error) -> Error {
    Error::FileAllocation {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}
