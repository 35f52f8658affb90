//! Backstore Drivers
//!
//! Implementations of [`BackstoreDriver`]:
//! - **memory**: in-process state for dry runs and tests
//! - **configfs**: the Linux SCSI target core

pub mod configfs;
pub mod memory;

pub use configfs::{ConfigfsConfig, ConfigfsDriver};
pub use memory::MemoryDriver;

use crate::domain::ports::BackstoreDriverRef;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// Available driver implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Memory,
    #[default]
    Configfs,
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverKind::Memory => write!(f, "memory"),
            DriverKind::Configfs => write!(f, "configfs"),
        }
    }
}

impl FromStr for DriverKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(DriverKind::Memory),
            "configfs" => Ok(DriverKind::Configfs),
            _ => Err(Error::Configuration(format!("Unknown driver: {}", s))),
        }
    }
}

/// Factory for creating drivers
pub struct DriverFactory;

impl DriverFactory {
    /// Create a driver of the given kind
    pub fn create(kind: DriverKind, configfs: &ConfigfsConfig) -> BackstoreDriverRef {
        match kind {
            DriverKind::Memory => Arc::new(MemoryDriver::new()),
            DriverKind::Configfs => Arc::new(ConfigfsDriver::new(configfs.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::BackstoreDriver;

    #[test]
    fn test_driver_kind_parse() {
        assert_eq!("memory".parse::<DriverKind>().unwrap(), DriverKind::Memory);
        assert_eq!("ConfigFS".parse::<DriverKind>().unwrap(), DriverKind::Configfs);
        assert!("nbd".parse::<DriverKind>().is_err());
        assert_eq!(DriverKind::default(), DriverKind::Configfs);
    }

    #[test]
    fn test_factory() {
        let driver = DriverFactory::create(DriverKind::Memory, &ConfigfsConfig::default());
        assert_eq!(driver.name(), "memory");

        let driver = DriverFactory::create(DriverKind::Configfs, &ConfigfsConfig::default());
        assert_eq!(driver.name(), "configfs");
    }
}
