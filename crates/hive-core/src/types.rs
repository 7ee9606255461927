//! Shared type definitions used across hive crates.

/// Unique identifier for a queued job.
pub type JobId = String;

/// Delimiter between identities in the serialized registry value.
pub const REGISTRY_DELIMITER: char = ',';
