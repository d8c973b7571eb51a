//! Pluggable value codecs.
//!
//! A [`Serializer`] turns a computed result into the bytes stored in the
//! cache and back. Encoding failures are fatal for the call that produced the
//! value; decoding failures are treated by the orchestrator as a miss.

use serde::{de::DeserializeOwned, Serialize};

use crate::SerializationError;

/// Codec used to persist cached values.
///
/// # Implementation Requirements
///
/// - `deserialize(serialize(v))` must rebuild a value equal to `v`
/// - Corrupted input must yield `Err`, never panic
/// - Implementations must be `Send + Sync` so one instance can serve
///   concurrent invocations of the same wrapped computation
pub trait Serializer: Send + Sync + 'static {
    /// Short name of the wire format, used in log fields and errors.
    fn format_name(&self) -> &'static str;

    /// Encode a value.
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, SerializationError>;

    /// Decode a value.
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, SerializationError>;
}

/// Compact binary codec backed by `bincode`. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeSerializer;

impl Serializer for BincodeSerializer {
    fn format_name(&self) -> &'static str {
        "bincode"
    }

    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, SerializationError> {
        bincode::serialize(value).map_err(|e| SerializationError::Encode {
            format: self.format_name().to_string(),
            reason: e.to_string(),
        })
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, SerializationError> {
        bincode::deserialize(bytes).map_err(|e| SerializationError::Decode {
            format: self.format_name().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Textual codec backed by `serde_json`.
///
/// Slower and larger than bincode, but entries stay human readable and can
/// be shared with non-Rust readers of the same store.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn format_name(&self) -> &'static str {
        "json"
    }

    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, SerializationError> {
        serde_json::to_vec(value).map_err(|e| SerializationError::Encode {
            format: self.format_name().to_string(),
            reason: e.to_string(),
        })
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, SerializationError> {
        serde_json::from_slice(bytes).map_err(|e| SerializationError::Decode {
            format: self.format_name().to_string(),
            reason: e.to_string(),
        })
    }
}
