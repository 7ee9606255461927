//! # hive-core
//!
//! Core types, errors, and utilities shared by the hive crates.
//!
//! This crate provides:
//! - [`HiveError`] - Error types for every hive operation
//! - [`logging`] - Tracing setup and log management utilities
//! - [`types`] - Shared type definitions used across hive crates
//!
//! ## Example
//!
//! ```no_run
//! use hive_core::{HiveError, Result, logging};
//!
//! fn main() -> hive_core::Result<()> {
//!     let _guard = logging::init_logging(None, false)?;
//!
//!     let config_path = std::path::Path::new("/etc/hive/config.yaml");
//!     if !config_path.exists() {
//!         return Err(HiveError::config_not_found(config_path));
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export main types for convenience
pub use error::{HiveError, Result};
pub use logging::{LogGuard, init_logging};
pub use types::JobId;
