//! signcache hit-path benchmark
//!
//! Warms one cache entry holding a 10 000 entry mapping, then serves it
//! repeatedly under each codec, signed and unsigned. Uses Redis when
//! `SIGNCACHE_REDIS_URL` is set and the `redis` feature is enabled, the
//! in-memory store otherwise.
//!
//! `SIGNCACHE_BENCH_REPEAT` overrides the number of timed calls.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use signcache::{
    CacheConfig, CacheError, CacheResult, CacheSettings, CacheStore,
    ConfigError, JsonSerializer, MemoryStore, Serializer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_REPEAT: u32 = 10_000;
const MAPPING_ENTRIES: u32 = 10_000;
const BENCH_EXPIRY: Duration = Duration::from_secs(2000);
const BENCH_SECRET: &str = "SECRETKEY";

#[tokio::main]
async fn main() -> CacheResult<()> {
    init_tracing()?;

    let settings = load_settings()?;
    let store = open_store(&settings).await?;
    let repeat = std::env::var("SIGNCACHE_BENCH_REPEAT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_REPEAT);

    tracing::info!(
        prefix = %settings.prefix,
        repeat,
        entries = MAPPING_ENTRIES,
        "Starting benchmark"
    );

    let base = CacheConfig::from_settings(&settings)?.with_expiry(BENCH_EXPIRY);
    let unsigned = base.clone();
    let signed = base.with_secret(BENCH_SECRET);

    run("bincode", unsigned.clone(), store.clone(), repeat).await?;
    run("secure-bincode", signed.clone(), store.clone(), repeat).await?;
    run(
        "json",
        unsigned.with_serializer(JsonSerializer),
        store.clone(),
        repeat,
    )
    .await?;
    run(
        "secure-json",
        signed.with_serializer(JsonSerializer),
        store,
        repeat,
    )
    .await?;

    Ok(())
}

fn init_tracing() -> CacheResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("signcache=error,signcache_bench=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| {
            CacheError::Config(ConfigError::InvalidValue {
                field: "RUST_LOG".to_string(),
                value: String::new(),
                reason: format!("Failed to init subscriber: {}", e),
            })
        })
}

/// Settings from the environment, or bench defaults when no prefix is set.
fn load_settings() -> CacheResult<CacheSettings> {
    match CacheSettings::from_env() {
        Ok(settings) => Ok(settings),
        Err(CacheError::Config(ConfigError::MissingRequired { .. })) => {
            let mut settings = CacheSettings::new("test-suite");
            settings.redis_url = std::env::var("SIGNCACHE_REDIS_URL").ok();
            Ok(settings)
        }
        Err(e) => Err(e),
    }
}

#[cfg(feature = "redis")]
async fn open_store(settings: &CacheSettings) -> CacheResult<Arc<dyn CacheStore>> {
    if let Some(url) = &settings.redis_url {
        tracing::info!(url = %url, "Using Redis store");
        let store = signcache::RedisStore::connect(url).await?;
        return Ok(Arc::new(store));
    }
    Ok(Arc::new(MemoryStore::new()))
}

#[cfg(not(feature = "redis"))]
async fn open_store(settings: &CacheSettings) -> CacheResult<Arc<dyn CacheStore>> {
    if settings.redis_url.is_some() {
        tracing::warn!("Built without the redis feature, using the in-memory store");
    }
    Ok(Arc::new(MemoryStore::new()))
}

async fn big_mapping() -> Result<BTreeMap<String, u32>, CacheError> {
    Ok((0..MAPPING_ENTRIES).map(|i| (i.to_string(), i)).collect())
}

async fn run<S: Serializer>(
    label: &'static str,
    config: CacheConfig<S>,
    store: Arc<dyn CacheStore>,
    repeat: u32,
) -> CacheResult<()> {
    let cached = config.wrap(store, label, |(): ()| big_mapping())?;

    // warm
    cached.call(()).await?;

    let started = Instant::now();
    for _ in 0..repeat {
        cached.call(()).await?;
    }
    let elapsed = started.elapsed();

    let stats = cached.stats();
    let per_call_us = elapsed.as_micros() as f64 / f64::from(repeat.max(1));
    tracing::info!(
        benchmark = label,
        elapsed_ms = elapsed.as_millis() as u64,
        per_call_us,
        hit_rate = stats.hit_rate(),
        integrity_failures = stats.integrity_failures,
        "Benchmark finished"
    );
    println!(
        "{label:<16} {repeat} calls in {:>8.2?} ({per_call_us:.1} us/call, hit rate {:.3})",
        elapsed,
        stats.hit_rate()
    );
    Ok(())
}
