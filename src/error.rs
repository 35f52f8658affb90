//! Error types for the backstore manager
//!
//! Provides structured error types for size parsing, name and index
//! allocation, path validation, file allocation and driver failures.

use thiserror::Error;

/// Unified error type for the backstore manager
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Parameter Errors
    // =========================================================================
    #[error("Invalid size: {0}")]
    InvalidSize(String),

    #[error("Invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("A size is required to create the backing file {path}")]
    SizeRequired { path: String },

    #[error("A size must not be given for device {path}, its own size is used")]
    SizeNotAllowed { path: String },

    #[error("Invalid backstore kind: {0}")]
    InvalidKind(String),

    // =========================================================================
    // Allocation Errors
    // =========================================================================
    #[error("Storage object {kind}/{name} already exists")]
    NameConflict { kind: String, name: String },

    #[error("Cannot find an available {kind} backstore index below {bound}")]
    NoAvailableIndex { kind: String, bound: u32 },

    #[error("Failed to allocate backing file {path}: {reason}")]
    FileAllocation { path: String, reason: String },

    // =========================================================================
    // Lookup Errors
    // =========================================================================
    #[error("No storage object named {kind}/{name}")]
    NotFound { kind: String, name: String },

    // =========================================================================
    // Driver Errors
    // =========================================================================
    #[error("Driver operation failed: {operation}: {reason}")]
    Driver { operation: String, reason: String },

    // =========================================================================
    // Parse / IO Errors
    // =========================================================================
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of an error, used for exit codes and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The request itself is malformed
    Usage,
    /// The request collides with existing state
    Conflict,
    /// A resource could not be allocated or found
    Resource,
    /// The resource driver or the host rejected the operation
    Driver,
}

impl Error {
    /// Build a driver error for an operation
    pub fn driver(operation: impl Into<String>, reason: impl ToString) -> Self {
        Error::Driver {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Build an invalid-path error
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Determine the category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidSize(_)
            | Error::InvalidPath { .. }
            | Error::SizeRequired { .. }
            | Error::SizeNotAllowed { .. }
            | Error::InvalidKind(_)
            | Error::Configuration(_)
            | Error::YamlParse(_)
            | Error::JsonParse(_) => ErrorCategory::Usage,

            Error::NameConflict { .. } => ErrorCategory::Conflict,

            Error::NoAvailableIndex { .. }
            | Error::FileAllocation { .. }
            | Error::NotFound { .. } => ErrorCategory::Resource,

            Error::Driver { .. } | Error::Io(_) | Error::Internal(_) => ErrorCategory::Driver,
        }
    }

    /// Process exit code for the command-line front end
    pub fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::Usage => 2,
            ErrorCategory::Conflict => 3,
            ErrorCategory::Resource => 4,
            ErrorCategory::Driver => 5,
        }
    }

    /// Check if this error came from the driver or the host
    pub fn is_driver_error(&self) -> bool {
        self.category() == ErrorCategory::Driver
    }
}

/// Result type alias for the backstore manager
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let err = Error::InvalidSize("10X".into());
        assert_eq!(err.category(), ErrorCategory::Usage);
        assert_eq!(err.exit_code(), 2);

        let err = Error::NameConflict {
            kind: "fileio".into(),
            name: "disk0".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Conflict);

        let err = Error::NoAvailableIndex {
            kind: "rd_mcp".into(),
            bound: 4,
        };
        assert_eq!(err.category(), ErrorCategory::Resource);

        let err = Error::driver("create_backend", "device busy");
        assert!(err.is_driver_error());
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_error_messages() {
        let err = Error::NameConflict {
            kind: "iblock".into(),
            name: "sdb".into(),
        };
        assert_eq!(err.to_string(), "Storage object iblock/sdb already exists");

        let err = Error::NotFound {
            kind: "fileio".into(),
            name: "nope".into(),
        };
        assert_eq!(err.to_string(), "No storage object named fileio/nope");
    }
}
