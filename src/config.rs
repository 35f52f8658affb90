//! Configuration
//!
//! Settings for the driver and the backend manager, loaded from an optional
//! YAML file. Every field has a default, so an empty file is valid.

use crate::backstore::manager::ManagerConfig;
use crate::driver::{ConfigfsConfig, DriverKind};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which driver to use
    pub driver: DriverKind,
    /// Configfs driver settings
    pub configfs: ConfigfsConfig,
    /// Backend manager settings
    pub manager: ManagerConfig,
}

impl Config {
    /// Parse configuration from YAML text
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_yaml(&text)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.manager.max_backend_index == 0 {
            return Err(Error::Configuration(
                "max_backend_index must be greater than zero".into(),
            ));
        }
        if self.manager.zero_fill_chunk_bytes == 0 {
            return Err(Error::Configuration(
                "zero_fill_chunk_bytes must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
