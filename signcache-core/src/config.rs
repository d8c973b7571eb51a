//! Configuration types

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{CacheError, CacheResult, ConfigError};

/// Default lifetime of a cache entry, in seconds.
pub const DEFAULT_EXPIRY_SECS: u64 = 120;

/// Default format version tag: this crate's `major.minor`.
///
/// Codec changes ship with a version bump, so entries written by an
/// incompatible release land under different keys.
pub fn default_version_tag() -> String {
    format!(
        "{}.{}",
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR")
    )
}

// ============================================================================
// SIGNING SECRET (TYPE-SAFE)
// ============================================================================

/// Secret used to sign cache entries.
///
/// Wrapped in `secrecy` so it never ends up in logs or `Debug` output.
#[derive(Clone)]
pub struct SigningSecret(SecretString);

impl SigningSecret {
    /// Create a new signing secret.
    ///
    /// # Errors
    /// Returns error if the secret is empty.
    pub fn new(secret: impl Into<String>) -> CacheResult<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(CacheError::Config(ConfigError::MissingRequired {
                field: "secret".to_string(),
            }));
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    /// Expose the secret value (only for computing checksums).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Length of the secret without exposing it.
    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    /// Always false; empty secrets are rejected by [`SigningSecret::new`].
    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }
}

impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningSecret([REDACTED, {} chars])", self.len())
    }
}

// ============================================================================
// SETTINGS
// ============================================================================

/// Plain cache settings, loadable from the environment or any serde source.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Namespace prefix for every key.
    pub prefix: String,
    /// Signing secret; unsigned entries when absent.
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,
    /// Entry lifetime in seconds.
    #[serde(default = "default_expiry_seconds")]
    pub expiry_seconds: u64,
    /// Format version tag; the crate's `major.minor` when absent.
    #[serde(default)]
    pub version_tag: Option<String>,
    /// Connection URL for the Redis store.
    #[serde(default)]
    pub redis_url: Option<String>,
}

fn default_expiry_seconds() -> u64 {
    DEFAULT_EXPIRY_SECS
}

impl CacheSettings {
    /// Settings with a prefix and defaults for everything else.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            secret: None,
            expiry_seconds: DEFAULT_EXPIRY_SECS,
            version_tag: None,
            redis_url: None,
        }
    }

    /// Load settings from `SIGNCACHE_*` environment variables.
    ///
    /// `SIGNCACHE_PREFIX` is required. `SIGNCACHE_SECRET`,
    /// `SIGNCACHE_EXPIRY_SECONDS`, `SIGNCACHE_VERSION_TAG` and
    /// `SIGNCACHE_REDIS_URL` are optional.
    pub fn from_env() -> CacheResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CacheResult<Self> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let prefix = non_empty("SIGNCACHE_PREFIX").ok_or_else(|| ConfigError::MissingRequired {
            field: "SIGNCACHE_PREFIX".to_string(),
        })?;

        let expiry_seconds = match non_empty("SIGNCACHE_EXPIRY_SECONDS") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "SIGNCACHE_EXPIRY_SECONDS".to_string(),
                value: raw.clone(),
                reason: "must be a positive integer".to_string(),
            })?,
            None => DEFAULT_EXPIRY_SECS,
        };

        let settings = Self {
            prefix,
            secret: non_empty("SIGNCACHE_SECRET"),
            expiry_seconds,
            version_tag: non_empty("SIGNCACHE_VERSION_TAG"),
            redis_url: non_empty("SIGNCACHE_REDIS_URL"),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Check the settings for values a cache cannot work with.
    pub fn validate(&self) -> CacheResult<()> {
        if self.prefix.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "prefix".to_string(),
            }
            .into());
        }
        if self.expiry_seconds == 0 {
            return Err(ConfigError::ExpiryTooShort {
                expiry: Duration::ZERO,
            }
            .into());
        }
        if matches!(&self.version_tag, Some(tag) if tag.is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "version_tag".to_string(),
                value: String::new(),
                reason: "must not be empty".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Entry lifetime.
    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_seconds)
    }

    /// Version tag, falling back to the default.
    pub fn version_tag(&self) -> String {
        self.version_tag.clone().unwrap_or_else(default_version_tag)
    }

    /// The signing secret, if configured.
    pub fn signing_secret(&self) -> CacheResult<Option<SigningSecret>> {
        self.secret.as_deref().map(SigningSecret::new).transpose()
    }
}

impl std::fmt::Debug for CacheSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheSettings")
            .field("prefix", &self.prefix)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("expiry_seconds", &self.expiry_seconds)
            .field("version_tag", &self.version_tag)
            .field("redis_url", &self.redis_url)
            .finish()
    }
}
