//! LIO Configfs Driver
//!
//! Drives the Linux SCSI target core through configfs. Backends are the
//! `{plugin}_{index}` directories below `{root}/core`, storage objects are
//! their subdirectories:
//!
//! ```text
//! /sys/kernel/config/target/core/
//! ├── fileio_0/
//! │   └── disk1/          control, enable, udev_path, info, wwn/vpd_unit_serial
//! ├── iblock_0/
//! │   └── sdb/
//! └── rd_mcp_2/
//!     └── rd0/
//! ```

use crate::backstore::params::{parse_hctl, RAMDISK_PAGE_SIZE};
use crate::domain::ports::{
    BackendRef, BackstoreDriver, BackstoreKind, StorageObjectHandle, StorageObjectInfo,
    StorageObjectParams,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

// =============================================================================
// Constants
// =============================================================================

const SERIAL_PREFIX: &str = "T10 VPD Unit Serial Number:";

// =============================================================================
// Configfs Driver Configuration
// =============================================================================

/// Configuration for the configfs driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigfsConfig {
    /// Target configfs root
    pub root: PathBuf,
    /// Path to sysfs, used to resolve pass-through devices
    pub sysfs_path: PathBuf,
    /// The tree is a plain directory standing in for configfs: attribute
    /// files must be removed before a node can be removed
    pub emulated: bool,
}

impl Default for ConfigfsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/sys/kernel/config/target"),
            sysfs_path: PathBuf::from("/sys"),
            emulated: false,
        }
    }
}

// =============================================================================
// Configfs Driver
// =============================================================================

/// Backstore driver over the target core configfs tree
#[derive(Debug, Clone)]
pub struct ConfigfsDriver {
    config: ConfigfsConfig,
}

impl ConfigfsDriver {
    pub fn new(config: ConfigfsConfig) -> Self {
        Self { config }
    }

    fn core_path(&self) -> PathBuf {
        self.config.root.join("core")
    }

    fn backend_path(&self, backend: &BackendRef) -> PathBuf {
        self.core_path().join(backend.name())
    }

    fn object_path(&self, backend: &BackendRef, name: &str) -> PathBuf {
        self.backend_path(backend).join(name)
    }

    /// Parse a `{plugin}_{index}` directory name
    fn parse_backend_name(name: &str) -> Option<BackendRef> {
        let (plugin, index) = name.rsplit_once('_')?;
        let kind = BackstoreKind::ALL
            .into_iter()
            .find(|kind| kind.plugin() == plugin)?;
        Some(BackendRef::new(kind, index.parse().ok()?))
    }

    fn remove_node(&self, path: &Path) -> io::Result<()> {
        if self.config.emulated {
            fs::remove_dir_all(path)
        } else {
            fs::remove_dir(path)
        }
    }

    /// Resolve a pass-through device path to its SCSI address
    fn resolve_hctl(&self, device: &str) -> Result<[u32; 4]> {
        if let Some(hctl) = parse_hctl(device) {
            return Ok(hctl);
        }

        let resolved = fs::canonicalize(device).unwrap_or_else(|_| PathBuf::from(device));
        let name = resolved
            .file_name()
            .ok_or_else(|| Error::invalid_path(device, "no device name"))?;

        // class/<subsystem>/<name>/device links to the H:C:T:L directory
        for class in ["class/block", "class/scsi_generic"] {
            let link = self.config.sysfs_path.join(class).join(name).join("device");
            let Ok(target) = fs::read_link(&link) else {
                continue;
            };
            if let Some(hctl) = target
                .file_name()
                .and_then(|address| parse_hctl(&address.to_string_lossy()))
            {
                debug!("Resolved {} to SCSI address {:?}", device, hctl);
                return Ok(hctl);
            }
        }

        Err(Error::invalid_path(device, "not a SCSI device"))
    }

    /// Control string written when the storage object is configured
    fn control(&self, params: &StorageObjectParams) -> Result<String> {
        let control = match params {
            StorageObjectParams::Pscsi { device } => {
                let [host, channel, target, lun] = self.resolve_hctl(device)?;
                format!(
                    "scsi_host_id={},scsi_channel_id={},scsi_target_id={},scsi_lun_id={}",
                    host, channel, target, lun
                )
            }
            StorageObjectParams::RamDisk { size_bytes, .. } => {
                format!("rd_pages={}", size_bytes.div_ceil(RAMDISK_PAGE_SIZE))
            }
            StorageObjectParams::FileIo {
                path,
                size_bytes,
                buffered,
                ..
            } => {
                let mut control = format!("fd_dev_name={}", path);
                if let Some(size) = size_bytes {
                    control.push_str(&format!(",fd_dev_size={}", size));
                }
                if *buffered {
                    control.push_str(",fd_buffered_io=1");
                }
                control
            }
            StorageObjectParams::Block { device, .. } => format!("udev_path={}", device),
        };
        Ok(control)
    }

    /// Write the attributes of a freshly created storage object node
    fn configure(&self, dir: &Path, params: &StorageObjectParams) -> Result<()> {
        let control = self.control(params)?;
        debug!("Writing control {} to {}", control, dir.display());
        write_attr(dir, "control", &control)?;

        if let Some(path) = params.path() {
            write_attr(dir, "udev_path", path)?;
        }

        write_attr(dir, "enable", "1")?;

        let generate_wwn = match params {
            StorageObjectParams::Pscsi { .. } => false,
            StorageObjectParams::RamDisk { generate_wwn, .. }
            | StorageObjectParams::FileIo { generate_wwn, .. }
            | StorageObjectParams::Block { generate_wwn, .. } => *generate_wwn,
        };
        if generate_wwn {
            let wwn = dir.join("wwn");
            if self.config.emulated {
                fs::create_dir_all(&wwn).map_err(|e| Error::driver("create_storage_object", e))?;
            }
            write_attr(&wwn, "vpd_unit_serial", &Uuid::new_v4().to_string())?;
        }

        Ok(())
    }

    fn read_object(&self, backend: &BackendRef, dir: &Path) -> Result<StorageObjectInfo> {
        let name = dir
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| Error::driver("list_storage_objects", "unnamed storage object"))?;

        let path = read_attr(dir, "udev_path").filter(|path| !path.is_empty());
        let status = match read_attr(dir, "enable").as_deref() {
            Some("1") => "activated",
            _ => "deactivated",
        };
        let wwn_generated = read_attr(&dir.join("wwn"), "vpd_unit_serial")
            .map(|serial| {
                !serial
                    .trim_start_matches(SERIAL_PREFIX)
                    .trim()
                    .is_empty()
            })
            .unwrap_or(false);

        // The kernel reports geometry in `info`; plain trees only have `control`
        let mut attrs = read_attr(dir, "info")
            .map(|info| DeviceAttrs::from_info(&info))
            .unwrap_or_default();
        if attrs.size_bytes.is_none() {
            if let Some(control) = read_attr(dir, "control") {
                attrs = DeviceAttrs::from_control(&control);
            }
        }

        Ok(StorageObjectInfo {
            name,
            kind: backend.kind,
            backend_index: backend.index,
            path,
            size_bytes: attrs.size_bytes,
            status: status.to_string(),
            wwn_generated,
            buffered: (backend.kind == BackstoreKind::FileIo).then_some(attrs.buffered),
        })
    }
}

impl BackstoreDriver for ConfigfsDriver {
    fn list_backends(&self) -> Result<Vec<BackendRef>> {
        let pattern = format!(
            "{}/*_*",
            glob::Pattern::escape(&self.core_path().to_string_lossy())
        );
        let entries = glob::glob(&pattern).map_err(|e| Error::driver("list_backends", e))?;

        let mut backends: Vec<BackendRef> = entries
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Skipping unreadable configfs entry: {}", e);
                    None
                }
            })
            .filter(|path| path.is_dir())
            .filter_map(|path| {
                path.file_name()
                    .and_then(|name| Self::parse_backend_name(&name.to_string_lossy()))
            })
            .collect();
        backends.sort();

        debug!("Found {} backends under {}", backends.len(), self.core_path().display());
        Ok(backends)
    }

    fn list_storage_objects(&self) -> Result<Vec<StorageObjectInfo>> {
        let mut objects = Vec::new();

        for backend in self.list_backends()? {
            let dir = self.backend_path(&backend);
            let mut children: Vec<PathBuf> = fs::read_dir(&dir)
                .map_err(|e| Error::driver("list_storage_objects", e))?
                .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                .filter(|path| path.is_dir())
                .collect();
            children.sort();

            for child in children {
                objects.push(self.read_object(&backend, &child)?);
            }
        }

        Ok(objects)
    }

    fn create_backend(&self, kind: BackstoreKind, index: u32) -> Result<BackendRef> {
        let backend = BackendRef::new(kind, index);
        let path = self.backend_path(&backend);

        fs::create_dir(&path).map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => {
                Error::driver("create_backend", format!("backend {} already exists", backend))
            }
            io::ErrorKind::NotFound => Error::driver(
                "create_backend",
                format!(
                    "{} not found, is the target core module loaded?",
                    self.core_path().display()
                ),
            ),
            _ => Error::driver("create_backend", e),
        })?;

        debug!("Created backend directory {}", path.display());
        Ok(backend)
    }

    fn delete_backend(&self, backend: &BackendRef) -> Result<()> {
        let path = self.backend_path(backend);
        self.remove_node(&path)
            .map_err(|e| Error::driver("delete_backend", format!("{}: {}", backend, e)))?;
        debug!("Removed backend directory {}", path.display());
        Ok(())
    }

    fn create_storage_object(
        &self,
        backend: &BackendRef,
        name: &str,
        params: &StorageObjectParams,
    ) -> Result<StorageObjectInfo> {
        if name.is_empty() || name.contains('/') || name.starts_with('.') {
            return Err(Error::driver(
                "create_storage_object",
                format!("invalid storage object name {:?}", name),
            ));
        }

        let dir = self.object_path(backend, name);
        fs::create_dir(&dir).map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => Error::driver(
                "create_storage_object",
                format!("{} already exists on backend {}", name, backend),
            ),
            _ => Error::driver("create_storage_object", format!("{}: {}", backend, e)),
        })?;

        if let Err(e) = self.configure(&dir, params) {
            if let Err(cleanup) = self.remove_node(&dir) {
                warn!("Failed to remove {}: {}", dir.display(), cleanup);
            }
            return Err(e);
        }

        self.read_object(backend, &dir)
    }

    fn delete_storage_object(&self, handle: &StorageObjectHandle) -> Result<()> {
        let dir = self.object_path(&handle.backend, &handle.name);
        self.remove_node(&dir).map_err(|e| {
            Error::driver(
                "delete_storage_object",
                format!("{} on {}: {}", handle.name, handle.backend, e),
            )
        })
    }

    fn plugin_version(&self, backend: &BackendRef) -> Result<Option<String>> {
        let dir = self.backend_path(backend);
        if !dir.is_dir() {
            return Err(Error::driver(
                "plugin_version",
                format!("backend {} does not exist", backend),
            ));
        }

        // e.g. "HBA Index: 1 plugin: fileio version: v4.0"
        Ok(read_attr(&dir, "hba_info").and_then(|info| {
            let (_, rest) = info.split_once("version:")?;
            rest.split_whitespace().next().map(String::from)
        }))
    }

    fn name(&self) -> &str {
        "configfs"
    }
}

// =============================================================================
// Attribute Helpers
// =============================================================================

fn write_attr(dir: &Path, attr: &str, value: &str) -> Result<()> {
    let path = dir.join(attr);
    fs::write(&path, value)
        .map_err(|e| Error::driver("write_attribute", format!("{}: {}", path.display(), e)))
}

fn read_attr(dir: &Path, attr: &str) -> Option<String> {
    fs::read_to_string(dir.join(attr))
        .ok()
        .map(|value| value.trim().to_string())
}

/// Geometry recovered from the `info` or `control` attribute
#[derive(Debug, Default, PartialEq, Eq)]
struct DeviceAttrs {
    size_bytes: Option<u64>,
    buffered: bool,
}

impl DeviceAttrs {
    /// Parse the kernel's `info` text, e.g.
    /// `TCM FILEIO ID: 0  File: /srv/a.img  Size: 1048576  Mode: Buffered-WCE`
    fn from_info(info: &str) -> Self {
        let size_bytes = value_after(info, "Size:")
            .or_else(|| {
                value_after(info, "PAGES/PAGE_SIZE Per SG:")
                    .and_then(|pages| pages.checked_mul(RAMDISK_PAGE_SIZE))
            });
        Self {
            size_bytes,
            buffered: info.contains("Mode: Buffered"),
        }
    }

    /// Parse a `key=value,...` control string
    fn from_control(control: &str) -> Self {
        let mut attrs = Self::default();
        for (key, value) in control.split(',').filter_map(|opt| opt.split_once('=')) {
            match key.trim() {
                "fd_dev_size" => attrs.size_bytes = value.trim().parse().ok(),
                "rd_pages" => {
                    attrs.size_bytes = value
                        .trim()
                        .parse::<u64>()
                        .ok()
                        .and_then(|pages| pages.checked_mul(RAMDISK_PAGE_SIZE))
                }
                "fd_buffered_io" => attrs.buffered = value.trim() == "1",
                _ => {}
            }
        }
        attrs
    }
}

fn value_after(text: &str, label: &str) -> Option<u64> {
    let (_, rest) = text.split_once(label)?;
    rest.split_whitespace().next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn driver() -> (TempDir, ConfigfsDriver) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("target/core")).unwrap();
        let driver = ConfigfsDriver::new(ConfigfsConfig {
            root: dir.path().join("target"),
            sysfs_path: dir.path().join("sys"),
            emulated: true,
        });
        (dir, driver)
    }

    #[test]
    fn test_parse_backend_name() {
        assert_eq!(
            ConfigfsDriver::parse_backend_name("rd_mcp_12"),
            Some(BackendRef::new(BackstoreKind::RdMcp, 12))
        );
        assert_eq!(
            ConfigfsDriver::parse_backend_name("iblock_0"),
            Some(BackendRef::new(BackstoreKind::Block, 0))
        );
        assert_eq!(ConfigfsDriver::parse_backend_name("alua"), None);
        assert_eq!(ConfigfsDriver::parse_backend_name("user_1"), None);
        assert_eq!(ConfigfsDriver::parse_backend_name("fileio_x"), None);
    }

    #[test]
    fn test_backend_directories() {
        let (dir, driver) = driver();

        driver.create_backend(BackstoreKind::FileIo, 1).unwrap();
        driver.create_backend(BackstoreKind::FileIo, 0).unwrap();
        driver.create_backend(BackstoreKind::RdMcp, 0).unwrap();
        fs::create_dir(dir.path().join("target/core/alua")).unwrap();

        assert_matches!(
            driver.create_backend(BackstoreKind::FileIo, 0),
            Err(Error::Driver { .. })
        );
        assert_eq!(
            driver.list_backends().unwrap(),
            vec![
                BackendRef::new(BackstoreKind::RdMcp, 0),
                BackendRef::new(BackstoreKind::FileIo, 0),
                BackendRef::new(BackstoreKind::FileIo, 1),
            ]
        );

        driver
            .delete_backend(&BackendRef::new(BackstoreKind::FileIo, 0))
            .unwrap();
        assert_eq!(driver.list_backends().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_core_directory() {
        let dir = tempfile::tempdir().unwrap();
        let driver = ConfigfsDriver::new(ConfigfsConfig {
            root: dir.path().join("target"),
            sysfs_path: dir.path().join("sys"),
            emulated: true,
        });
        assert_matches!(
            driver.create_backend(BackstoreKind::Block, 0),
            Err(Error::Driver { .. })
        );
        assert!(driver.list_backends().unwrap().is_empty());
    }

    #[test]
    fn test_fileio_object_attributes() {
        let (dir, driver) = driver();
        let backend = driver.create_backend(BackstoreKind::FileIo, 0).unwrap();

        let params = StorageObjectParams::FileIo {
            path: "/srv/disk.img".into(),
            size_bytes: Some(1_048_576),
            generate_wwn: true,
            buffered: true,
        };
        let info = driver.create_storage_object(&backend, "disk", &params).unwrap();

        let node = dir.path().join("target/core/fileio_0/disk");
        assert_eq!(
            fs::read_to_string(node.join("control")).unwrap(),
            "fd_dev_name=/srv/disk.img,fd_dev_size=1048576,fd_buffered_io=1"
        );
        let serial = fs::read_to_string(node.join("wwn/vpd_unit_serial")).unwrap();
        assert!(Uuid::parse_str(&serial).is_ok());

        assert_eq!(info.name, "disk");
        assert_eq!(info.path.as_deref(), Some("/srv/disk.img"));
        assert_eq!(info.size_bytes, Some(1_048_576));
        assert_eq!(info.status, "activated");
        assert_eq!(info.buffered, Some(true));
        assert!(info.wwn_generated);

        assert_eq!(driver.list_storage_objects().unwrap(), vec![info.clone()]);

        driver.delete_storage_object(&info.handle()).unwrap();
        assert!(!node.exists());
        assert!(driver.list_storage_objects().unwrap().is_empty());
    }

    #[test]
    fn test_ramdisk_pages() {
        let (dir, driver) = driver();
        let backend = driver.create_backend(BackstoreKind::RdMcp, 0).unwrap();

        let params = StorageObjectParams::RamDisk {
            size_bytes: 10_000,
            generate_wwn: false,
        };
        let info = driver.create_storage_object(&backend, "rd0", &params).unwrap();

        let node = dir.path().join("target/core/rd_mcp_0/rd0");
        assert_eq!(fs::read_to_string(node.join("control")).unwrap(), "rd_pages=3");
        assert!(!node.join("wwn").exists());
        assert_eq!(info.size_bytes, Some(3 * RAMDISK_PAGE_SIZE));
        assert_eq!(info.path, None);
        assert_eq!(info.buffered, None);
        assert!(!info.wwn_generated);
    }

    #[test]
    fn test_pscsi_resolves_address_through_sysfs() {
        let (dir, driver) = driver();
        let device_dir = dir.path().join("sys/class/block/sdx");
        fs::create_dir_all(&device_dir).unwrap();
        std::os::unix::fs::symlink(
            "../../../devices/pci0000:00/host2/target2:0:1/2:0:1:3",
            device_dir.join("device"),
        )
        .unwrap();

        let backend = driver.create_backend(BackstoreKind::Pscsi, 0).unwrap();
        let params = StorageObjectParams::Pscsi {
            device: "/dev/sdx".into(),
        };
        driver.create_storage_object(&backend, "sdx", &params).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("target/core/pscsi_0/sdx/control")).unwrap(),
            "scsi_host_id=2,scsi_channel_id=0,scsi_target_id=1,scsi_lun_id=3"
        );

        // Unknown devices leave nothing behind
        let unknown = StorageObjectParams::Pscsi {
            device: "/dev/sdy".into(),
        };
        assert_matches!(
            driver.create_storage_object(&backend, "sdy", &unknown),
            Err(Error::InvalidPath { .. })
        );
        assert!(!dir.path().join("target/core/pscsi_0/sdy").exists());
    }

    #[test]
    fn test_rejects_bad_names_and_duplicates() {
        let (_dir, driver) = driver();
        let backend = driver.create_backend(BackstoreKind::Block, 0).unwrap();
        let params = StorageObjectParams::Block {
            device: "/dev/sdb".into(),
            generate_wwn: false,
        };

        assert!(driver.create_storage_object(&backend, "a/b", &params).is_err());
        driver.create_storage_object(&backend, "sdb", &params).unwrap();
        assert_matches!(
            driver.create_storage_object(&backend, "sdb", &params),
            Err(Error::Driver { .. })
        );
    }

    #[test]
    fn test_device_attrs_from_info() {
        let fileio = DeviceAttrs::from_info(
            "Status: ACTIVATED  Max Queue Depth: 128\nTCM FILEIO ID: 0  File: /srv/a.img  Size: 4096  Mode: Buffered-WCE",
        );
        assert_eq!(
            fileio,
            DeviceAttrs {
                size_bytes: Some(4096),
                buffered: true
            }
        );

        let rd = DeviceAttrs::from_info(
            "TCM RamDisk ID: 0  RamDisk MCP\n  PAGES/PAGE_SIZE Per SG: 256  SG_table_count: 1",
        );
        assert_eq!(rd.size_bytes, Some(256 * RAMDISK_PAGE_SIZE));
        assert!(!rd.buffered);
    }

    #[test]
    fn test_plugin_version_from_hba_info() {
        let (dir, driver) = driver();
        let fileio = driver.create_backend(BackstoreKind::FileIo, 0).unwrap();
        let block = driver.create_backend(BackstoreKind::Block, 0).unwrap();
        fs::write(
            dir.path().join("target/core/fileio_0/hba_info"),
            "HBA Index: 1 plugin: fileio version: v4.0\n",
        )
        .unwrap();

        assert_eq!(
            driver.plugin_version(&fileio).unwrap().as_deref(),
            Some("v4.0")
        );
        assert_eq!(driver.plugin_version(&block).unwrap(), None);
        assert_matches!(
            driver.plugin_version(&BackendRef::new(BackstoreKind::RdDr, 0)),
            Err(Error::Driver { .. })
        );

        // The attribute file is not a storage object
        assert!(driver.list_storage_objects().unwrap().is_empty());
    }

    #[test]
    fn test_device_attrs_page_count_overflow() {
        // 2^52 pages of 4 KiB is 2^64 bytes
        assert_eq!(
            DeviceAttrs::from_control("rd_pages=4503599627370496").size_bytes,
            None
        );
        assert_eq!(
            DeviceAttrs::from_info("PAGES/PAGE_SIZE Per SG: 4503599627370496").size_bytes,
            None
        );
        assert_eq!(
            DeviceAttrs::from_control("rd_pages=4503599627370495").size_bytes,
            Some(u64::MAX - (RAMDISK_PAGE_SIZE - 1))
        );
    }

    #[test]
    fn test_manager_rejects_oversized_ramdisk() {
        use crate::backstore::{
            BackendManager, ManagerConfig, RamDiskRequest, SizeInput, SysfsProbe,
        };
        use std::sync::Arc;

        let (dir, driver) = driver();
        let manager = BackendManager::new(
            Arc::new(driver.clone()),
            Arc::new(SysfsProbe::new(dir.path().join("sys"))),
            ManagerConfig::default(),
        )
        .unwrap();

        assert_matches!(
            manager.create_rd_mcp(RamDiskRequest {
                name: "huge".into(),
                size: SizeInput::Bytes(u64::MAX),
                generate_wwn: None,
            }),
            Err(Error::InvalidSize(_))
        );
        assert!(driver.list_backends().unwrap().is_empty());
        assert!(driver.list_storage_objects().unwrap().is_empty());
    }
}
