//! signcache Test Utilities
//!
//! Shared test infrastructure for the signcache workspace:
//! - Mock stores and call counters
//! - Captured tracing events
//! - Proptest generators for key arguments and cached values
//! - Fixtures for common scenarios
//! - Custom assertions

pub use signcache_core::{
    CacheError, CacheResult, ChecksumError, ConfigError, SerializationError, StoreError,
};
pub use signcache_storage::{CacheStore, MemoryStore, StoreResult, ValuePair};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

// ============================================================================
// MOCKS
// ============================================================================

/// Counts invocations of a wrapped computation.
///
/// Clones share the same counter, so one clone can move into the closure
/// while the test keeps another.
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicU64>);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call and return the new total.
    pub fn tick(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// A [`MemoryStore`] whose reads and writes can be made to fail.
///
/// `fail_reads` and `fail_writes` turn every operation of that kind into a
/// [`StoreError`]. `reject_writes` makes writes return an unacknowledged
/// reply instead.
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    reject_writes: AtomicBool,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The backing store, for inspecting or seeding entries.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Read operations attempted, failed ones included.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Write operations attempted, failed ones included.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn before_read(&self, command: &str) -> StoreResult<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected(command));
        }
        Ok(())
    }

    fn before_write(&self, command: &str) -> StoreResult<bool> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(injected(command));
        }
        Ok(!self.reject_writes.load(Ordering::SeqCst))
    }
}

fn injected(command: &str) -> StoreError {
    StoreError::Command {
        command: command.to_string(),
        reason: "injected failure".to_string(),
    }
}

#[async_trait]
impl CacheStore for FaultyStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.before_read("GET")?;
        self.inner.get(key).await
    }

    async fn set_with_expiry(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<bool> {
        if !self.before_write("SETEX")? {
            return Ok(false);
        }
        self.inner.set_with_expiry(key, value, ttl).await
    }

    async fn get_pair(&self, key_a: &str, key_b: &str) -> StoreResult<ValuePair> {
        self.before_read("GET")?;
        self.inner.get_pair(key_a, key_b).await
    }

    async fn set_pair_with_expiry(
        &self,
        key_a: &str,
        value_a: &[u8],
        key_b: &str,
        value_b: &[u8],
        ttl: Duration,
    ) -> StoreResult<(bool, bool)> {
        if !self.before_write("MULTI/SETEX")? {
            return Ok((false, false));
        }
        self.inner
            .set_pair_with_expiry(key_a, value_a, key_b, value_b, ttl)
            .await
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        if !self.before_write("DEL")? {
            return Ok(0);
        }
        self.inner.delete(keys).await
    }
}

// ============================================================================
// CAPTURED LOGS
// ============================================================================

pub mod logs {
    //! A tracing layer that records events for assertions.

    use std::fmt;
    use std::sync::{Arc, Mutex};

    use tracing::field::{Field, Visit};
    use tracing::subscriber::DefaultGuard;
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::registry::LookupSpan;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::Layer;

    /// One recorded event.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct CapturedEvent {
        pub level: Level,
        pub message: String,
        /// Names of the enclosing spans, outermost first.
        pub spans: Vec<String>,
    }

    /// Events recorded while the guard from [`capture`] is alive.
    #[derive(Debug, Clone, Default)]
    pub struct CapturedEvents(Arc<Mutex<Vec<CapturedEvent>>>);

    impl CapturedEvents {
        pub fn all(&self) -> Vec<CapturedEvent> {
            self.0.lock().map(|events| events.clone()).unwrap_or_default()
        }

        /// Events whose message equals `message`.
        pub fn with_message(&self, message: &str) -> Vec<CapturedEvent> {
            self.all()
                .into_iter()
                .filter(|event| event.message == message)
                .collect()
        }
    }

    struct MessageVisitor(String);

    impl Visit for MessageVisitor {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{value:?}");
            }
        }
    }

    struct CaptureLayer(CapturedEvents);

    impl<S> Layer<S> for CaptureLayer
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
            let mut visitor = MessageVisitor(String::new());
            event.record(&mut visitor);
            let spans: Vec<String> = ctx
                .event_scope(event)
                .map(|scope| scope.from_root().map(|span| span.name().to_string()).collect())
                .unwrap_or_default();
            if let Ok(mut events) = (self.0).0.lock() {
                events.push(CapturedEvent {
                    level: *event.metadata().level(),
                    message: visitor.0,
                    spans,
                });
            }
        }
    }

    /// Record every event on this thread until the guard is dropped.
    ///
    /// Spans must be created after this call to be seen as parents.
    pub fn capture() -> (CapturedEvents, DefaultGuard) {
        let events = CapturedEvents::default();
        let guard = tracing_subscriber::registry()
            .with(CaptureLayer(events.clone()))
            .set_default();
        (events, guard)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for cache arguments and values.

    use super::fixtures::Subscription;
    use chrono::{DateTime, TimeZone, Utc};
    use proptest::prelude::*;
    use uuid::Uuid;

    /// Generate a random UUID.
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    /// Generate a timestamp between 2000 and 2100, whole seconds.
    pub fn arb_timestamp() -> impl Strategy<Value = DateTime<Utc>> {
        (946_684_800i64..4_102_444_800i64)
            .prop_map(|secs| Utc.timestamp_opt(secs, 0).single().unwrap_or_default())
    }

    /// Generate a key prefix: non-empty, no separators.
    pub fn arb_prefix() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_-]{0,15}"
    }

    /// Generate a string argument that may contain separators.
    pub fn arb_string_arg() -> impl Strategy<Value = String> {
        "[ -~]{0,32}"
    }

    /// Generate a signing secret.
    pub fn arb_secret() -> impl Strategy<Value = String> {
        "[A-Za-z0-9]{1,64}"
    }

    /// Generate a subscription record.
    pub fn arb_subscription() -> impl Strategy<Value = Subscription> {
        (
            arb_uuid(),
            arb_uuid(),
            "[a-z ]{1,24}",
            arb_timestamp(),
            proptest::option::of(arb_timestamp()),
            any::<bool>(),
            any::<u32>(),
        )
            .prop_map(
                |(subscription_id, customer_id, description, start_date, end_date, insync, note_count)| {
                    Subscription {
                        subscription_id,
                        customer_id,
                        description,
                        start_date,
                        end_date,
                        insync,
                        note_count,
                    }
                },
            )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built values for common testing scenarios.

    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    /// A record shaped like a typical cached domain lookup.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Subscription {
        pub subscription_id: Uuid,
        pub customer_id: Uuid,
        pub description: String,
        pub start_date: DateTime<Utc>,
        pub end_date: Option<DateTime<Utc>>,
        pub insync: bool,
        pub note_count: u32,
    }

    /// Error type for wrapped computations in tests.
    #[derive(Debug, Clone, thiserror::Error)]
    pub enum TestError {
        #[error("computation failed: {0}")]
        Computation(String),

        #[error(transparent)]
        Cache(#[from] CacheError),
    }

    pub fn test_subscription() -> Subscription {
        Subscription {
            subscription_id: Uuid::from_u128(0x1234),
            customer_id: Uuid::from_u128(0x5678),
            description: "Fiber 10G".to_string(),
            start_date: Utc
                .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
            end_date: None,
            insync: true,
            note_count: 3,
        }
    }

    /// A `"0".."9999"` to `i` mapping, the shape used for throughput runs.
    pub fn large_mapping(entries: u32) -> BTreeMap<String, u32> {
        (0..entries).map(|i| (i.to_string(), i)).collect()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for signcache error shapes.

    use super::*;

    /// Assert that a result is a Config error.
    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &CacheResult<T>) {
        match result {
            Err(CacheError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert that an error is an encode failure.
    #[track_caller]
    pub fn assert_encode_error(err: &CacheError) {
        match err {
            CacheError::Serialization(SerializationError::Encode { .. }) => {}
            other => panic!("Expected Encode error, got: {:?}", other),
        }
    }

    /// Assert that `store` holds exactly `keys`.
    #[track_caller]
    pub fn assert_keys(store: &MemoryStore, keys: &[&str]) {
        let mut expected: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        expected.sort();
        assert_eq!(store.keys(), expected);
    }
}
