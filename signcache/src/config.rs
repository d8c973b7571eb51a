//! Builder for wrapped computations.

use std::any::type_name;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use signcache_core::{
    default_version_tag, unsafe_parameters, BincodeSerializer, CacheError, CacheResult,
    CacheSettings, CallArgs, ConfigError, KeyDeriver, Serializer, SigningSecret,
    DEFAULT_EXPIRY_SECS,
};
use signcache_storage::CacheStore;

use crate::cached::CachedFn;

/// Configuration for one cached computation.
///
/// Built with `with_*` methods and consumed by [`CacheConfig::wrap`], which
/// validates everything up front so misconfiguration never surfaces on a
/// call.
///
/// # Example
///
/// ```ignore
/// let lookup = CacheConfig::new("orchestrator")
///     .with_secret("SECRETKEY")
///     .with_expiry(Duration::from_secs(3600))
///     .wrap(store, "subscriptions.lookup", |(id,): (Uuid,)| fetch(id))?;
///
/// let subscription = lookup.call((id,)).await?;
/// ```
#[derive(Clone)]
pub struct CacheConfig<S = BincodeSerializer> {
    prefix: String,
    secret: Option<String>,
    static_name: Option<String>,
    expiry: Duration,
    serializer: S,
    version_tag: String,
}

impl CacheConfig<BincodeSerializer> {
    /// Config with a key prefix, no signing, automatic keys, two minute
    /// expiry and the bincode codec.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            secret: None,
            static_name: None,
            expiry: Duration::from_secs(DEFAULT_EXPIRY_SECS),
            serializer: BincodeSerializer,
            version_tag: default_version_tag(),
        }
    }

    /// Config from loaded settings.
    pub fn from_settings(settings: &CacheSettings) -> CacheResult<Self> {
        settings.validate()?;
        let mut config = Self::new(settings.prefix.clone())
            .with_expiry(settings.expiry())
            .with_version_tag(settings.version_tag());
        if let Some(secret) = &settings.secret {
            config = config.with_secret(secret.clone());
        }
        Ok(config)
    }
}

impl<S: Serializer> CacheConfig<S> {
    /// Sign entries with HMAC-SHA512 under `secret`.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Use one fixed key for every call, ignoring arguments.
    pub fn with_static_name(mut self, name: impl Into<String>) -> Self {
        self.static_name = Some(name.into());
        self
    }

    /// Set the entry lifetime. Must be at least one second.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    /// Set the format version tag embedded in every key.
    pub fn with_version_tag(mut self, tag: impl Into<String>) -> Self {
        self.version_tag = tag.into();
        self
    }

    /// Swap the value codec.
    pub fn with_serializer<S2: Serializer>(self, serializer: S2) -> CacheConfig<S2> {
        CacheConfig {
            prefix: self.prefix,
            secret: self.secret,
            static_name: self.static_name,
            expiry: self.expiry,
            serializer,
            version_tag: self.version_tag,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    pub fn version_tag(&self) -> &str {
        &self.version_tag
    }

    pub fn is_signed(&self) -> bool {
        self.secret.is_some()
    }

    /// Check the config without wrapping anything.
    pub fn validate(&self) -> CacheResult<()> {
        if self.prefix.is_empty() {
            return Err(missing("prefix"));
        }
        if self.version_tag.is_empty() {
            return Err(missing("version_tag"));
        }
        if self.expiry < Duration::from_secs(1) {
            return Err(ConfigError::ExpiryTooShort {
                expiry: self.expiry,
            }
            .into());
        }
        if matches!(&self.static_name, Some(name) if name.is_empty()) {
            return Err(missing("static_name"));
        }
        if matches!(&self.secret, Some(secret) if secret.is_empty()) {
            return Err(missing("secret"));
        }
        Ok(())
    }

    /// Wrap an async computation under an explicit qualified name.
    ///
    /// A name containing `.` marks a bound method: its first argument is the
    /// receiver and is left out of keys. Names are lowercased in keys.
    ///
    /// The computation must return a single future resolving to
    /// `Result<T, E>`; stream producers do not satisfy the bound.
    pub fn wrap<A, F, Fut, T, E>(
        self,
        store: Arc<dyn CacheStore>,
        name: impl Into<String>,
        func: F,
    ) -> CacheResult<CachedFn<A, F, S>>
    where
        A: CallArgs,
        F: Fn(A) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Serialize + DeserializeOwned + Send,
        E: From<CacheError>,
    {
        self.validate()?;
        let name = name.into();
        if name.is_empty() && self.static_name.is_none() {
            return Err(missing("name"));
        }
        let secret = self
            .secret
            .as_deref()
            .map(SigningSecret::new)
            .transpose()?;

        let keys = KeyDeriver::new(
            &self.prefix,
            &self.version_tag,
            &name,
            self.static_name.as_deref(),
        );

        let findings = if keys.is_static() {
            Vec::new()
        } else {
            unsafe_parameters(&A::signature(), keys.skips_receiver())
        };
        for finding in &findings {
            tracing::warn!(
                function = %name,
                parameter = %finding,
                "Argument may not produce a stable cache key; consider a static name"
            );
        }

        Ok(CachedFn::new(
            func,
            store,
            self.serializer,
            secret,
            self.expiry,
            keys,
            name,
            findings,
        ))
    }

    /// Wrap a named async function, keyed by its Rust path.
    ///
    /// Closures have no name of their own (every closure in one function
    /// shares a type path), so they are rejected; use [`CacheConfig::wrap`]
    /// with an explicit name instead.
    pub fn wrap_fn<A, F, Fut, T, E>(
        self,
        store: Arc<dyn CacheStore>,
        func: F,
    ) -> CacheResult<CachedFn<A, F, S>>
    where
        A: CallArgs,
        F: Fn(A) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Serialize + DeserializeOwned + Send,
        E: From<CacheError>,
    {
        let name = qualified_name_of::<F>()?;
        self.wrap(store, name, func)
    }
}

impl<S> std::fmt::Debug for CacheConfig<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheConfig")
            .field("prefix", &self.prefix)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("static_name", &self.static_name)
            .field("expiry", &self.expiry)
            .field("serializer", &type_name::<S>())
            .field("version_tag", &self.version_tag)
            .finish()
    }
}

/// Rust path of `F` with `::` segments joined by `_`, so it never reads as
/// a bound method. Anonymous types (`{{closure}}`) are refused.
fn qualified_name_of<F>() -> CacheResult<String> {
    let path = type_name::<F>();
    if path.contains("{{") {
        return Err(ConfigError::InvalidValue {
            field: "name".to_string(),
            value: path.to_string(),
            reason: "anonymous functions need an explicit name".to_string(),
        }
        .into());
    }
    Ok(path.replace("::", "_"))
}

fn missing(field: &str) -> CacheError {
    ConfigError::MissingRequired {
        field: field.to_string(),
    }
    .into()
}
