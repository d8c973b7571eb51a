//! The per-call caching protocol.
//!
//! Every call derives a key, optionally consults the store, verifies signed
//! entries, and on a miss runs the wrapped computation and writes the result
//! back. Store failures, corrupt entries and checksum mismatches all fail
//! open to a recomputation; only an unencodable result is an error.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use signcache_core::{
    checksum_key, compute_checksum, verify_checksum, CacheError, CacheResult, CallArgs,
    KeyDeriver, Serializer, SigningSecret, UnsafeParameter,
};
use signcache_storage::CacheStore;
use tracing::{info_span, Instrument, Span};

use crate::stats::{CacheStats, StatsRecorder};

/// Predicate deciding, per call, whether to skip the cache read.
pub type Revalidate<A> = Arc<dyn Fn(&A) -> bool + Send + Sync>;

/// An async computation whose results are cached in a shared store.
///
/// Created by [`CacheConfig::wrap`](crate::CacheConfig::wrap). Cheap to share
/// behind an `Arc`; all state besides the counters is immutable.
pub struct CachedFn<A, F, S> {
    func: F,
    store: Arc<dyn CacheStore>,
    serializer: S,
    secret: Option<SigningSecret>,
    expiry: Duration,
    keys: KeyDeriver,
    name: String,
    unsafe_params: Vec<UnsafeParameter>,
    revalidate: Option<Revalidate<A>>,
    span: Span,
    stats: StatsRecorder,
    _args: PhantomData<fn(A)>,
}

impl<A, F, S> CachedFn<A, F, S>
where
    A: CallArgs,
    S: Serializer,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        func: F,
        store: Arc<dyn CacheStore>,
        serializer: S,
        secret: Option<SigningSecret>,
        expiry: Duration,
        keys: KeyDeriver,
        name: String,
        unsafe_params: Vec<UnsafeParameter>,
    ) -> Self {
        let span = info_span!(
            "cached_result",
            function = %name,
            signed = secret.is_some(),
            format = serializer.format_name(),
        );
        Self {
            func,
            store,
            serializer,
            secret,
            expiry,
            keys,
            name,
            unsafe_params,
            revalidate: None,
            span,
            stats: StatsRecorder::default(),
            _args: PhantomData,
        }
    }

    /// Skip the cache read whenever `predicate` returns true for a call's
    /// arguments. The fresh result is still written back.
    pub fn with_revalidate(mut self, predicate: impl Fn(&A) -> bool + Send + Sync + 'static) -> Self {
        self.revalidate = Some(Arc::new(predicate));
        self
    }

    /// Emit this wrapper's events inside `span` instead of the default
    /// `cached_result` span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Qualified name the wrapper was created with.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    pub fn is_signed(&self) -> bool {
        self.secret.is_some()
    }

    /// Parameters flagged at wrap time as unsafe for automatic keys.
    pub fn unsafe_parameters(&self) -> &[UnsafeParameter] {
        &self.unsafe_params
    }

    /// The key a call with `args` reads and writes.
    pub fn cache_key(&self, args: &A) -> String {
        self.keys.key_for(args)
    }

    /// Counters since the wrapper was created.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Delete the entry for `args` and its checksum companion.
    ///
    /// Returns how many keys existed. Unlike calls, this reports store
    /// errors.
    pub async fn invalidate(&self, args: &A) -> CacheResult<u64> {
        let key = self.cache_key(args);
        let companion = checksum_key(&key);
        let removed = self
            .store
            .delete(&[key.clone(), companion])
            .instrument(self.span.clone())
            .await?;
        tracing::debug!(parent: &self.span, cache_key = %key, removed, "Cache invalidated");
        Ok(removed)
    }

    /// Run one call through the cache.
    ///
    /// Errors from the computation propagate unchanged. The only error the
    /// cache adds is a result that cannot be encoded, converted through
    /// `E: From<CacheError>`.
    pub async fn call<Fut, T, E>(&self, args: A) -> Result<T, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
    {
        self.call_inner(args).instrument(self.span.clone()).await
    }

    async fn call_inner<Fut, T, E>(&self, args: A) -> Result<T, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
    {
        let key = self.keys.key_for(&args);
        tracing::debug!(cache_key = %key, "Cache called");
        let bypass = self.revalidate.as_ref().is_some_and(|revalidate| revalidate(&args));

        if bypass {
            tracing::debug!(cache_key = %key, "Revalidating, skipping cache read");
            self.stats.bypass();
        } else {
            if let Some(value) = self.read::<T>(&key).await {
                tracing::info!(cache_key = %key, "Cache contains key, serving from cache");
                self.stats.hit();
                return Ok(value);
            }
            tracing::info!(cache_key = %key, "Cache doesn't contain key, calling real function");
            self.stats.miss();
        }

        let result = (self.func)(args).await?;
        self.write(&key, &result).await?;
        Ok(result)
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match &self.secret {
            Some(secret) => self.read_signed(secret, key).await?,
            None => self.read_unsigned(key).await?,
        };
        match self.serializer.deserialize(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(cache_key = %key, error = %e, "Cached value could not be decoded");
                self.stats.decode_failure();
                None
            }
        }
    }

    async fn read_unsigned(&self, key: &str) -> Option<Vec<u8>> {
        match self.store.get(key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(cache_key = %key, error = %e, "Cache read failed");
                self.stats.read_error();
                None
            }
        }
    }

    async fn read_signed(&self, secret: &SigningSecret, key: &str) -> Option<Vec<u8>> {
        let (value, checksum) = match self.store.get_pair(key, &checksum_key(key)).await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(cache_key = %key, error = %e, "Cache read failed");
                self.stats.read_error();
                return None;
            }
        };
        let (value, checksum) = (value?, checksum?);

        match verify_checksum(secret.expose(), &value, &checksum) {
            Ok(true) => Some(value),
            Ok(false) => {
                let recalculated = compute_checksum(secret.expose(), &value).unwrap_or_default();
                tracing::error!(
                    cache_key = %key,
                    correct_checksum = %String::from_utf8_lossy(&checksum),
                    recalculated_checksum = %recalculated,
                    "Checksum for cache was wrong, someone tampered with the values!"
                );
                self.stats.integrity_failure();
                None
            }
            Err(e) => {
                tracing::error!(cache_key = %key, error = %e, "Stored checksum is unreadable");
                self.stats.integrity_failure();
                None
            }
        }
    }

    async fn write<T: Serialize>(&self, key: &str, value: &T) -> CacheResult<()> {
        let bytes = self.serializer.serialize(value)?;

        match &self.secret {
            Some(secret) => {
                let checksum = compute_checksum(secret.expose(), &bytes)?;
                let acks = self
                    .store
                    .set_pair_with_expiry(
                        key,
                        &bytes,
                        &checksum_key(key),
                        checksum.as_bytes(),
                        self.expiry,
                    )
                    .await;
                match acks {
                    Ok((true, true)) => {}
                    Ok((value_ok, checksum_ok)) => {
                        tracing::warn!(cache_key = %key, value_ok, checksum_ok, "Cache not set");
                        self.stats.write_failure();
                    }
                    Err(e) => {
                        tracing::warn!(cache_key = %key, error = %e, "Cache not set");
                        self.stats.write_failure();
                    }
                }
            }
            None => match self.store.set_with_expiry(key, &bytes, self.expiry).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(cache_key = %key, value_ok = false, "Cache not set");
                    self.stats.write_failure();
                }
                Err(e) => {
                    tracing::warn!(cache_key = %key, error = %e, "Cache not set");
                    self.stats.write_failure();
                }
            },
        }
        Ok(())
    }
}

impl<A, F, S> std::fmt::Debug for CachedFn<A, F, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedFn")
            .field("name", &self.name)
            .field("keys", &self.keys)
            .field("signed", &self.secret.is_some())
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}
