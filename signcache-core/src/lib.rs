//! signcache Core - Types and Pure Functions
//!
//! Everything the result cache needs that does not perform I/O: the error
//! taxonomy, keyed checksums, value codecs, cache key derivation and
//! settings. The storage and orchestration crates build on these.

pub mod args;
pub mod checksum;
pub mod config;
pub mod error;
pub mod key;
pub mod serializer;

pub use args::{ArgKind, Args, CallArgs, KeyArg, Opaque, Param, Signature};
pub use checksum::{checksum_key, compute_checksum, verify_checksum, CHECKSUM_KEY_SUFFIX};
pub use config::{
    default_version_tag, CacheSettings, SigningSecret, DEFAULT_EXPIRY_SECS,
};
pub use error::{
    CacheError, CacheResult, ChecksumError, ConfigError, SerializationError, StoreError,
};
pub use key::{
    argument_suffix, derive_key, is_bound_method, unsafe_parameters, KeyDeriver,
    UnsafeParameter, KEY_SEPARATOR,
};
pub use serializer::{BincodeSerializer, JsonSerializer, Serializer};
