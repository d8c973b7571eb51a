//! signcache - Signed result cache for async computations
//!
//! Wraps an async computation so its results are stored in a shared
//! key-value store with a fixed lifetime. Keys are derived from a prefix, a
//! format version tag, the computation's name and its arguments. With a
//! secret configured every entry carries an HMAC-SHA512 checksum in a
//! companion key, and entries that fail verification are recomputed.
//!
//! The cache never makes a call fail that would have succeeded without it:
//! store outages, corrupt entries and tampered entries all fall back to
//! running the computation.
//!
//! ```ignore
//! let store = Arc::new(MemoryStore::new());
//! let quote = CacheConfig::new("pricing")
//!     .with_secret(secret)
//!     .wrap(store, "quotes.latest", |(symbol,): (String,)| fetch_quote(symbol))?;
//!
//! let first = quote.call(("ACME".to_string(),)).await?;
//! let cached = quote.call(("ACME".to_string(),)).await?;
//! ```

mod cached;
mod config;
mod stats;

pub use cached::{CachedFn, Revalidate};
pub use config::CacheConfig;
pub use stats::CacheStats;

pub use signcache_core::{
    checksum_key, compute_checksum, default_version_tag, verify_checksum, ArgKind, Args,
    BincodeSerializer, CacheError, CacheResult, CacheSettings, CallArgs, ChecksumError,
    ConfigError, JsonSerializer, KeyArg, Opaque, Param, SerializationError, Serializer,
    Signature, SigningSecret, StoreError, UnsafeParameter, CHECKSUM_KEY_SUFFIX,
    DEFAULT_EXPIRY_SECS,
};
#[cfg(feature = "redis")]
pub use signcache_storage::RedisStore;
pub use signcache_storage::{CacheStore, MemoryStore, StoreResult, ValuePair};
