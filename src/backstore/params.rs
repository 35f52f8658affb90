//! Kind-specific Creation Parameters
//!
//! Request types for each backstore kind and the validation that turns a
//! request into driver parameters. Validation may emit advisory notices; it
//! never touches the driver. The file-backed path may create the backing file.

use super::fileio::{allocate_file, FillMode};
use super::size::{format_size, SizeInput};
use crate::domain::ports::{DeviceProbe, PathKind, StorageObjectParams};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Ram disks are allocated in whole pages of this size
pub const RAMDISK_PAGE_SIZE: u64 = 4096;

// =============================================================================
// Defaults
// =============================================================================

/// Defaults applied to optional creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateDefaults {
    /// Generate a unit serial
    pub generate_wwn: bool,
    /// Buffered I/O for file-backed objects
    pub buffered: bool,
    /// Create new backing files sparse
    pub sparse: bool,
}

impl Default for CreateDefaults {
    fn default() -> Self {
        Self {
            generate_wwn: true,
            buffered: true,
            sparse: true,
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Pass-through storage object request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PscsiRequest {
    pub name: String,
    /// Device path or `H:C:T:L` address
    pub device: String,
}

/// Ram disk storage object request (either flavour)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RamDiskRequest {
    pub name: String,
    pub size: SizeInput,
    pub generate_wwn: Option<bool>,
}

/// File-backed storage object request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIoRequest {
    pub name: String,
    pub file_or_dev: String,
    pub size: Option<SizeInput>,
    pub generate_wwn: Option<bool>,
    pub buffered: Option<bool>,
    /// Only used when the backing file is created
    pub sparse: Option<bool>,
}

/// Block-backed storage object request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRequest {
    pub name: String,
    pub device: String,
    pub generate_wwn: Option<bool>,
}

// =============================================================================
// Notices
// =============================================================================

/// Advisory raised while validating a request; never aborts the operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum Notice {
    /// The target is a block device; the block backstore would serve it better
    BlockBackstorePreferred { path: String },
    /// An existing file's own size is used instead of the requested one
    ExistingFileSizeUsed {
        path: String,
        size_bytes: u64,
        requested_bytes: u64,
    },
    /// A new backing file was created
    BackingFileCreated {
        path: String,
        size_bytes: u64,
        sparse: bool,
    },
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::BlockBackstorePreferred { path } => {
                write!(f, "Note: block backstore preferred for best results with {}", path)
            }
            Notice::ExistingFileSizeUsed {
                path,
                size_bytes,
                requested_bytes,
            } => write!(
                f,
                "{} exists, using its size ({}) instead of the requested {}",
                path,
                format_size(*size_bytes),
                format_size(*requested_bytes)
            ),
            Notice::BackingFileCreated {
                path,
                size_bytes,
                sparse,
            } => write!(
                f,
                "Created {}backing file {} of {}",
                if *sparse { "sparse " } else { "" },
                path,
                format_size(*size_bytes)
            ),
        }
    }
}

// =============================================================================
// Prepared Parameters
// =============================================================================

/// Validated driver parameters for one creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    pub params: StorageObjectParams,
    pub notices: Vec<Notice>,
    /// Backing file created during validation, removed again on rollback
    pub created_file: Option<PathBuf>,
}

impl Prepared {
    fn new(params: StorageObjectParams) -> Self {
        Self {
            params,
            notices: Vec::new(),
            created_file: None,
        }
    }

    fn notice(mut self, notice: Notice) -> Self {
        info!("{}", notice);
        self.notices.push(notice);
        self
    }
}

/// Validate a pass-through request
pub fn prepare_pscsi(probe: &dyn DeviceProbe, request: &PscsiRequest) -> Result<Prepared> {
    let device = request.device.trim();
    if device.is_empty() {
        return Err(Error::invalid_path(device, "a device path or H:C:T:L address is required"));
    }

    let params = StorageObjectParams::Pscsi {
        device: device.to_string(),
    };

    if !device.starts_with('/') {
        if parse_hctl(device).is_none() {
            return Err(Error::invalid_path(
                device,
                "expected a device path or an H:C:T:L address",
            ));
        }
        return Ok(Prepared::new(params));
    }

    match probe.classify(Path::new(device))? {
        PathKind::Missing => Err(Error::invalid_path(device, "no such device")),
        kind if kind.is_device() => Ok(Prepared::new(params).notice(Notice::BlockBackstorePreferred {
            path: device.to_string(),
        })),
        _ => Ok(Prepared::new(params)),
    }
}

/// Validate a ram disk request
pub fn prepare_ramdisk(request: &RamDiskRequest, defaults: &CreateDefaults) -> Result<Prepared> {
    let size_bytes = request.size.to_bytes()?;
    if size_bytes == 0 {
        return Err(Error::InvalidSize("ramdisk size must be greater than zero".into()));
    }
    // The page-rounded size must stay representable
    if size_bytes
        .div_ceil(RAMDISK_PAGE_SIZE)
        .checked_mul(RAMDISK_PAGE_SIZE)
        .is_none()
    {
        return Err(Error::InvalidSize(format!(
            "ramdisk size {} is too large",
            size_bytes
        )));
    }

    Ok(Prepared::new(StorageObjectParams::RamDisk {
        size_bytes,
        generate_wwn: request.generate_wwn.unwrap_or(defaults.generate_wwn),
    }))
}

/// Validate a file-backed request, creating the backing file when needed
pub fn prepare_fileio(
    probe: &dyn DeviceProbe,
    request: &FileIoRequest,
    defaults: &CreateDefaults,
    zero_fill_chunk: usize,
) -> Result<Prepared> {
    let path = request.file_or_dev.trim();
    if path.is_empty() {
        return Err(Error::invalid_path(path, "a file or device path is required"));
    }

    let requested = request.size.as_ref().map(SizeInput::to_bytes).transpose()?;
    let generate_wwn = request.generate_wwn.unwrap_or(defaults.generate_wwn);
    let buffered = request.buffered.unwrap_or(defaults.buffered);
    let sparse = request.sparse.unwrap_or(defaults.sparse);

    debug!(
        "Using params size={:?} generate_wwn={} buffered={} sparse={}",
        requested, generate_wwn, buffered, sparse
    );

    let params = |size_bytes| StorageObjectParams::FileIo {
        path: path.to_string(),
        size_bytes,
        generate_wwn,
        buffered,
    };

    match probe.classify(Path::new(path))? {
        PathKind::Missing => {
            let size_bytes = requested.ok_or_else(|| Error::SizeRequired {
                path: path.to_string(),
            })?;
            if size_bytes == 0 {
                return Err(Error::InvalidSize("file size must be greater than zero".into()));
            }

            let mode = if sparse {
                FillMode::Sparse
            } else {
                FillMode::ZeroFill {
                    chunk_size: zero_fill_chunk,
                }
            };
            allocate_file(Path::new(path), size_bytes, mode)?;

            let mut prepared = Prepared::new(params(Some(size_bytes))).notice(
                Notice::BackingFileCreated {
                    path: path.to_string(),
                    size_bytes,
                    sparse,
                },
            );
            prepared.created_file = Some(PathBuf::from(path));
            Ok(prepared)
        }
        PathKind::RegularFile { len } => {
            let prepared = Prepared::new(params(Some(len)));
            match requested {
                Some(requested_bytes) => Ok(prepared.notice(Notice::ExistingFileSizeUsed {
                    path: path.to_string(),
                    size_bytes: len,
                    requested_bytes,
                })),
                None => Ok(prepared),
            }
        }
        PathKind::BlockDevice | PathKind::Partition => {
            if requested.is_some() {
                return Err(Error::SizeNotAllowed {
                    path: path.to_string(),
                });
            }
            Ok(Prepared::new(params(None)).notice(Notice::BlockBackstorePreferred {
                path: path.to_string(),
            }))
        }
        PathKind::Other => Err(Error::invalid_path(
            path,
            "neither a regular file nor a block device",
        )),
    }
}

/// Validate a block-backed request
pub fn prepare_block(
    probe: &dyn DeviceProbe,
    request: &BlockRequest,
    defaults: &CreateDefaults,
) -> Result<Prepared> {
    let device = request.device.trim();
    if device.is_empty() {
        return Err(Error::invalid_path(device, "a device path is required"));
    }

    match probe.classify(Path::new(device))? {
        kind if kind.is_device() => Ok(Prepared::new(StorageObjectParams::Block {
            device: device.to_string(),
            generate_wwn: request.generate_wwn.unwrap_or(defaults.generate_wwn),
        })),
        PathKind::Missing => Err(Error::invalid_path(device, "no such device")),
        _ => Err(Error::invalid_path(device, "not a block device")),
    }
}

/// Parse an `H:C:T:L` SCSI address
pub fn parse_hctl(address: &str) -> Option<[u32; 4]> {
    let mut parts = address.split(':');
    let mut hctl = [0u32; 4];
    for slot in hctl.iter_mut() {
        *slot = parts.next()?.trim().parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(hctl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backstore::testing::FakeProbe;
    use assert_matches::assert_matches;
    use std::fs;

    fn fileio(path: &str, size: Option<&str>) -> FileIoRequest {
        FileIoRequest {
            name: "disk".into(),
            file_or_dev: path.into(),
            size: size.map(SizeInput::from),
            generate_wwn: None,
            buffered: None,
            sparse: None,
        }
    }

    #[test]
    fn test_parse_hctl() {
        assert_eq!(parse_hctl("0:0:1:2"), Some([0, 0, 1, 2]));
        assert_eq!(parse_hctl("0:0:1"), None);
        assert_eq!(parse_hctl("0:0:1:2:3"), None);
        assert_eq!(parse_hctl("a:b:c:d"), None);
    }

    #[test]
    fn test_pscsi_on_block_device_advises_block_backstore() {
        let probe = FakeProbe::new().with("/dev/sdb", PathKind::BlockDevice);
        let request = PscsiRequest {
            name: "p".into(),
            device: "/dev/sdb".into(),
        };

        let prepared = prepare_pscsi(&probe, &request).unwrap();
        assert_matches!(prepared.notices.as_slice(), [Notice::BlockBackstorePreferred { .. }]);
    }

    #[test]
    fn test_pscsi_address_and_bad_input() {
        let probe = FakeProbe::new();
        let ok = PscsiRequest {
            name: "p".into(),
            device: "1:0:0:0".into(),
        };
        assert!(prepare_pscsi(&probe, &ok).unwrap().notices.is_empty());

        let bad = PscsiRequest {
            name: "p".into(),
            device: "sdb".into(),
        };
        assert_matches!(prepare_pscsi(&probe, &bad), Err(Error::InvalidPath { .. }));

        let missing = PscsiRequest {
            name: "p".into(),
            device: "/dev/nope".into(),
        };
        assert_matches!(prepare_pscsi(&probe, &missing), Err(Error::InvalidPath { .. }));
    }

    #[test]
    fn test_ramdisk_defaults_and_zero_size() {
        let defaults = CreateDefaults::default();
        let request = RamDiskRequest {
            name: "rd".into(),
            size: "1M".into(),
            generate_wwn: None,
        };
        let prepared = prepare_ramdisk(&request, &defaults).unwrap();
        assert_eq!(
            prepared.params,
            StorageObjectParams::RamDisk {
                size_bytes: 1024 * 1024,
                generate_wwn: true
            }
        );

        let zero = RamDiskRequest {
            size: 0u64.into(),
            ..request
        };
        assert_matches!(prepare_ramdisk(&zero, &defaults), Err(Error::InvalidSize(_)));
    }

    #[test]
    fn test_ramdisk_size_must_fit_in_whole_pages() {
        let defaults = CreateDefaults::default();
        let request = |size: u64| RamDiskRequest {
            name: "rd".into(),
            size: size.into(),
            generate_wwn: None,
        };

        assert_matches!(
            prepare_ramdisk(&request(u64::MAX), &defaults),
            Err(Error::InvalidSize(_))
        );
        assert_matches!(
            prepare_ramdisk(&request(u64::MAX - RAMDISK_PAGE_SIZE + 2), &defaults),
            Err(Error::InvalidSize(_))
        );

        // Largest size whose last page still fits
        let largest = u64::MAX - (RAMDISK_PAGE_SIZE - 1);
        assert!(prepare_ramdisk(&request(largest), &defaults).is_ok());
    }

    #[test]
    fn test_fileio_new_file_requires_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.img");
        let probe = FakeProbe::new();

        let request = fileio(path.to_str().unwrap(), None);
        assert_matches!(
            prepare_fileio(&probe, &request, &CreateDefaults::default(), 4096),
            Err(Error::SizeRequired { .. })
        );
        assert!(!path.exists());
    }

    #[test]
    fn test_fileio_new_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.img");
        let probe = FakeProbe::new();

        let mut request = fileio(path.to_str().unwrap(), Some("8K"));
        request.sparse = Some(false);

        let prepared = prepare_fileio(&probe, &request, &CreateDefaults::default(), 1000).unwrap();
        assert_eq!(prepared.created_file.as_deref(), Some(path.as_path()));
        assert_eq!(fs::metadata(&path).unwrap().len(), 8192);
        assert_matches!(
            prepared.params,
            StorageObjectParams::FileIo {
                size_bytes: Some(8192),
                buffered: true,
                ..
            }
        );
    }

    #[test]
    fn test_fileio_existing_file_size_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.img");
        fs::write(&path, vec![0u8; 2048]).unwrap();
        let probe = FakeProbe::new();

        let request = fileio(path.to_str().unwrap(), Some("1G"));
        let prepared = prepare_fileio(&probe, &request, &CreateDefaults::default(), 4096).unwrap();

        assert!(prepared.created_file.is_none());
        assert_matches!(
            prepared.params,
            StorageObjectParams::FileIo {
                size_bytes: Some(2048),
                ..
            }
        );
        assert_matches!(
            prepared.notices.as_slice(),
            [Notice::ExistingFileSizeUsed {
                size_bytes: 2048,
                ..
            }]
        );
        assert_eq!(fs::metadata(&path).unwrap().len(), 2048);
    }

    #[test]
    fn test_fileio_device_forbids_size() {
        let probe = FakeProbe::new()
            .with("/dev/sdc", PathKind::BlockDevice)
            .with("/dev/sdc1", PathKind::Partition);
        let defaults = CreateDefaults::default();

        assert_matches!(
            prepare_fileio(&probe, &fileio("/dev/sdc", Some("10G")), &defaults, 4096),
            Err(Error::SizeNotAllowed { .. })
        );
        assert_matches!(
            prepare_fileio(&probe, &fileio("/dev/sdc1", Some("1G")), &defaults, 4096),
            Err(Error::SizeNotAllowed { .. })
        );

        let prepared = prepare_fileio(&probe, &fileio("/dev/sdc", None), &defaults, 4096).unwrap();
        assert_matches!(
            prepared.params,
            StorageObjectParams::FileIo {
                size_bytes: None,
                ..
            }
        );
    }

    #[test]
    fn test_fileio_other_path_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let probe = FakeProbe::new();

        let request = fileio(dir.path().to_str().unwrap(), Some("1M"));
        assert_matches!(
            prepare_fileio(&probe, &request, &CreateDefaults::default(), 4096),
            Err(Error::InvalidPath { .. })
        );
    }

    #[test]
    fn test_block_requires_device() {
        let probe = FakeProbe::new().with("/dev/sdd", PathKind::BlockDevice);
        let defaults = CreateDefaults::default();

        let ok = BlockRequest {
            name: "b".into(),
            device: "/dev/sdd".into(),
            generate_wwn: Some(false),
        };
        assert_eq!(
            prepare_block(&probe, &ok, &defaults).unwrap().params,
            StorageObjectParams::Block {
                device: "/dev/sdd".into(),
                generate_wwn: false
            }
        );

        let missing = BlockRequest {
            device: "/dev/none".into(),
            ..ok
        };
        assert_matches!(
            prepare_block(&probe, &missing, &defaults),
            Err(Error::InvalidPath { .. })
        );
    }
}
