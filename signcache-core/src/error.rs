//! Error types for signcache operations

use std::time::Duration;
use thiserror::Error;

/// Store transport errors.
///
/// Raised by store adapters. The orchestrator never lets these reach a
/// caller: read failures degrade to a miss and write failures are logged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store connection failed: {reason}")]
    Connection { reason: String },

    #[error("Store command {command} failed: {reason}")]
    Command { command: String, reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Serializer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SerializationError {
    #[error("Failed to encode value with {format}: {reason}")]
    Encode { format: String, reason: String },

    #[error("Failed to decode value with {format}: {reason}")]
    Decode { format: String, reason: String },
}

/// Checksum guard errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChecksumError {
    #[error("Secret rejected by HMAC: {reason}")]
    InvalidKey { reason: String },

    #[error("Stored checksum is not a valid hex digest: {reason}")]
    MalformedDigest { reason: String },
}

/// Configuration errors, raised once when a computation is wrapped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Expiry must be at least one whole second, got {expiry:?}")]
    ExpiryTooShort { expiry: Duration },
}

/// Master error type for all signcache errors.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Checksum error: {0}")]
    Checksum(#[from] ChecksumError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl CacheError {
    /// True for the errors that may reach the caller of a wrapped computation.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CacheError::Config(_)
                | CacheError::Serialization(SerializationError::Encode { .. })
                | CacheError::Checksum(ChecksumError::InvalidKey { .. })
        )
    }
}

/// Result type alias for signcache operations.
pub type CacheResult<T> = Result<T, CacheError>;

// =============================================================================
// TESTS
// =============================================================================
