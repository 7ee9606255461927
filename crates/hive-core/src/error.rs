//! Error types for hive operations.
//!
//! This module defines [`HiveError`], the error enum shared by every hive
//! crate. Coordination failures are never retried here; they are surfaced to
//! the worker's startup or shutdown path so the host can decide what is fatal.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`HiveError`].
pub type Result<T> = std::result::Result<T, HiveError>;

/// Error type for all hive operations.
#[derive(Debug, Error)]
pub enum HiveError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file not found
    #[error("Configuration not found at {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration file is invalid YAML
    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    /// A configuration value could not be parsed or is out of range
    #[error("Invalid value for {key}: {message}")]
    ConfigValidation { key: String, message: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error with context
    #[error("I/O error {operation}: {path}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory creation failed
    #[error("Failed to create directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Registry Errors
    // =========================================================================
    /// The process-wide key/value slot could not be read or written
    #[error("Global store unavailable for key {key}: {message}")]
    StoreUnavailable { key: String, message: String },

    /// A registry operation failed for a specific worker identity
    #[error("Registry {operation} failed for {identity}")]
    Registry {
        operation: String,
        identity: String,
        #[source]
        source: Box<HiveError>,
    },

    /// Identity string cannot be stored or parsed
    #[error("Invalid worker identity {identity:?}: {reason}")]
    InvalidIdentity { identity: String, reason: String },

    // =========================================================================
    // Worker Errors
    // =========================================================================
    /// Worker thread could not be spawned
    #[error("Failed to spawn worker thread {thread_name}")]
    ThreadSpawn {
        thread_name: String,
        #[source]
        source: std::io::Error,
    },

    /// Worker thread panicked
    #[error("Worker thread {thread_name} panicked")]
    WorkerPanicked { thread_name: String },

    // =========================================================================
    // Job Errors
    // =========================================================================
    /// A job failed while being performed
    #[error("Job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (bug in hive)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl HiveError {
    // =========================================================================
    // Constructor helpers for common error patterns
    // =========================================================================

    /// Create a ConfigNotFound error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ConfigNotFound {
            path: path.into(),
            source: None,
        }
    }

    /// Create a ConfigNotFound error with source
    pub fn config_not_found_with_source(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ConfigNotFound {
            path: path.into(),
            source: Some(source),
        }
    }

    /// Create a ConfigValidation error
    pub fn config_validation(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Create a StoreUnavailable error
    pub fn store_unavailable(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Wrap a failure of a registry operation with the identity involved
    pub fn registry(operation: impl Into<String>, identity: impl Into<String>, source: HiveError) -> Self {
        Self::Registry {
            operation: operation.into(),
            identity: identity.into(),
            source: Box::new(source),
        }
    }

    /// Create an InvalidIdentity error
    pub fn invalid_identity(identity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentity {
            identity: identity.into(),
            reason: reason.into(),
        }
    }

    /// Create a JobFailed error
    pub fn job_failed(job_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JobFailed {
            job_id: job_id.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    // =========================================================================
    // Error classification helpers
    // =========================================================================

    /// Returns true if this error came from the registry or its backing store
    pub fn is_registry_error(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable { .. } | Self::Registry { .. } | Self::InvalidIdentity { .. }
        )
    }

    /// Returns true if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. } | Self::ConfigInvalid { .. } | Self::ConfigValidation { .. }
        )
    }

    /// Returns true if this error is fatal (the host should stop the worker)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Internal { .. } | Self::ThreadSpawn { .. } | Self::WorkerPanicked { .. }
        ) || self.is_registry_error()
    }

    /// Returns actionable guidance for the user
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::ConfigNotFound { .. } => Some("Create ~/.hive/config.yaml or pass --config"),
            Self::ConfigInvalid { .. } => Some("Check YAML syntax of the configuration file"),
            Self::ConfigValidation { .. } => {
                Some("Check the environment variable or config entry named in the error")
            }
            Self::StoreUnavailable { .. } | Self::Registry { .. } => {
                Some("The worker registry could not be updated; restart the worker host")
            }
            Self::InvalidIdentity { .. } => Some("Worker names must not contain ','"),
            _ => None,
        }
    }
}
