//! In-process store with per-key expiry.
//!
//! Backs tests and single-process deployments. Expired entries are removed
//! when a read runs into them, and every [`SWEEP_INTERVAL`] writes a full
//! sweep drops the rest. Paired operations take the write lock once, so
//! both halves are observed together.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use signcache_core::StoreError;

use crate::{CacheStore, StoreResult, ValuePair};

#[derive(Debug, Clone)]
struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Instant,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Writes between full sweeps of expired entries.
pub const SWEEP_INTERVAL: u64 = 1024;

/// Lifetime used when `now + ttl` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Expiry instant for `ttl`, saturating instead of overflowing.
fn deadline(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Thread-safe in-memory [`CacheStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoredValue>>,
    writes: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `keys`, removing any that turn out to be expired.
    fn read_live<const N: usize>(&self, keys: [&str; N]) -> StoreResult<[Option<Vec<u8>>; N]> {
        let now = Instant::now();
        let mut expired = false;
        let values = {
            let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
            keys.map(|key| match entries.get(key) {
                Some(v) if v.is_live(now) => Some(v.bytes.clone()),
                Some(_) => {
                    expired = true;
                    None
                }
                None => None,
            })
        };
        if expired {
            let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
            for key in keys {
                if entries.get(key).is_some_and(|v| !v.is_live(now)) {
                    entries.remove(key);
                }
            }
        }
        Ok(values)
    }

    /// Count one write and sweep expired entries when one is due.
    fn after_write(&self, entries: &mut HashMap<String, StoredValue>, now: Instant) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % SWEEP_INTERVAL == 0 {
            entries.retain(|_, v| v.is_live(now));
        }
    }

    /// Drop every expired entry now. Returns how many were removed.
    pub fn purge_expired(&self) -> StoreResult<usize> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, v| v.is_live(now));
        Ok(before - entries.len())
    }

    /// Raw bytes under `key`, bypassing any interpretation.
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.read_live([key]).ok().and_then(|[value]| value)
    }

    /// Overwrite `key` with arbitrary bytes, keeping its remaining lifetime
    /// (or `ttl` for a new key).
    pub fn insert_raw(&self, key: &str, bytes: impl Into<Vec<u8>>, ttl: Duration) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        let now = Instant::now();
        let expires_at = entries
            .get(key)
            .filter(|v| v.is_live(now))
            .map(|v| v.expires_at)
            .unwrap_or_else(|| deadline(now, ttl));
        entries.insert(
            key.to_string(),
            StoredValue {
                bytes: bytes.into(),
                expires_at,
            },
        );
        Ok(())
    }

    /// Expire `key` immediately. Returns whether it was live.
    pub fn expire(&self, key: &str) -> StoreResult<bool> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries
            .remove(key)
            .is_some_and(|v| v.is_live(Instant::now())))
    }

    /// Remaining lifetime of `key`.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.read().ok()?;
        let now = Instant::now();
        entries
            .get(key)
            .filter(|v| v.is_live(now))
            .map(|v| v.expires_at - now)
    }

    /// Whether `key` holds a live value.
    pub fn contains_key(&self, key: &str) -> bool {
        self.raw(key).is_some()
    }

    /// Live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = match self.entries.read() {
            Ok(entries) => entries
                .iter()
                .filter(|(_, v)| v.is_live(now))
                .map(|(k, _)| k.clone())
                .collect(),
            Err(_) => Vec::new(),
        };
        keys.sort();
        keys
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    /// Whether the store holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    pub fn clear(&self) -> StoreResult<()> {
        self.entries
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .clear();
        Ok(())
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let [value] = self.read_live([key])?;
        Ok(value)
    }

    async fn set_with_expiry(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<bool> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        let now = Instant::now();
        entries.insert(
            key.to_string(),
            StoredValue {
                bytes: value.to_vec(),
                expires_at: deadline(now, ttl),
            },
        );
        self.after_write(&mut entries, now);
        Ok(true)
    }

    async fn get_pair(&self, key_a: &str, key_b: &str) -> StoreResult<ValuePair> {
        let [a, b] = self.read_live([key_a, key_b])?;
        Ok((a, b))
    }

    async fn set_pair_with_expiry(
        &self,
        key_a: &str,
        value_a: &[u8],
        key_b: &str,
        value_b: &[u8],
        ttl: Duration,
    ) -> StoreResult<(bool, bool)> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        let now = Instant::now();
        let expires_at = deadline(now, ttl);
        entries.insert(
            key_a.to_string(),
            StoredValue {
                bytes: value_a.to_vec(),
                expires_at,
            },
        );
        entries.insert(
            key_b.to_string(),
            StoredValue {
                bytes: value_b.to_vec(),
                expires_at,
            },
        );
        self.after_write(&mut entries, now);
        Ok((true, true))
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        let now = Instant::now();
        let removed = keys
            .iter()
            .filter_map(|key| entries.remove(key))
            .filter(|v| v.is_live(now))
            .count();
        Ok(removed as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = MemoryStore::new();
        assert!(store.set_with_expiry("k", b"v", MINUTE).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert!(store.ttl("k").unwrap() <= MINUTE);
    }

    #[tokio::test]
    async fn test_expired_entries_are_invisible() {
        let store = MemoryStore::new();
        store
            .set_with_expiry("k", b"v", Duration::from_millis(1))
            .await
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    fn stored_len(store: &MemoryStore) -> usize {
        store.entries.read().unwrap().len()
    }

    #[tokio::test]
    async fn test_expired_entries_are_removed_on_read() {
        let store = MemoryStore::new();
        for i in 0..100 {
            store
                .set_with_expiry(&format!("k{i}"), b"v", Duration::from_millis(1))
                .await
                .unwrap();
        }
        std::thread::sleep(Duration::from_millis(5));
        for i in 0..50 {
            assert_eq!(store.get(&format!("k{i}")).await.unwrap(), None);
        }
        for i in (50..100).step_by(2) {
            store
                .get_pair(&format!("k{i}"), &format!("k{}", i + 1))
                .await
                .unwrap();
        }
        assert_eq!(stored_len(&store), 0);
    }

    #[tokio::test]
    async fn test_writes_sweep_expired_entries() {
        let store = MemoryStore::new();
        for i in 0..10 {
            store
                .set_with_expiry(&format!("old{i}"), b"v", Duration::from_millis(1))
                .await
                .unwrap();
        }
        std::thread::sleep(Duration::from_millis(5));
        for i in 10..SWEEP_INTERVAL {
            store
                .set_with_expiry(&format!("new{i}"), b"v", MINUTE)
                .await
                .unwrap();
        }
        assert_eq!(stored_len(&store), (SWEEP_INTERVAL - 10) as usize);
        assert!(!store.keys().iter().any(|k| k.starts_with("old")));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        store
            .set_with_expiry("gone", b"v", Duration::from_millis(1))
            .await
            .unwrap();
        store.set_with_expiry("kept", b"v", MINUTE).await.unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.purge_expired().unwrap(), 1);
        assert_eq!(stored_len(&store), 1);
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_overflow() {
        let store = MemoryStore::new();
        assert!(store.set_with_expiry("k", b"v", Duration::MAX).await.unwrap());
        let acks = store
            .set_pair_with_expiry("a", b"1", "b", b"2", Duration::MAX)
            .await
            .unwrap();
        assert_eq!(acks, (true, true));
        store.insert_raw("c", b"3".to_vec(), Duration::MAX).unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert!(store.ttl("a").unwrap() > MINUTE);
    }

    #[tokio::test]
    async fn test_force_expire() {
        let store = MemoryStore::new();
        store.set_with_expiry("k", b"v", MINUTE).await.unwrap();
        assert!(store.expire("k").unwrap());
        assert!(!store.expire("k").unwrap());
        assert!(!store.contains_key("k"));
    }

    #[tokio::test]
    async fn test_pair_round_trip() {
        let store = MemoryStore::new();
        let acks = store
            .set_pair_with_expiry("a", b"1", "a-checksum", b"2", MINUTE)
            .await
            .unwrap();
        assert_eq!(acks, (true, true));

        let (a, b) = store.get_pair("a", "a-checksum").await.unwrap();
        assert_eq!(a, Some(b"1".to_vec()));
        assert_eq!(b, Some(b"2".to_vec()));

        let (a, missing) = store.get_pair("a", "other").await.unwrap();
        assert!(a.is_some());
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_insert_raw_keeps_remaining_lifetime() {
        let store = MemoryStore::new();
        store
            .set_with_expiry("k", b"v", Duration::from_secs(5))
            .await
            .unwrap();
        store.insert_raw("k", b"tampered".to_vec(), MINUTE).unwrap();
        assert_eq!(store.raw("k"), Some(b"tampered".to_vec()));
        assert!(store.ttl("k").unwrap() <= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_delete_counts_live_keys() {
        let store = MemoryStore::new();
        store.set_with_expiry("a", b"1", MINUTE).await.unwrap();
        store.set_with_expiry("b", b"2", MINUTE).await.unwrap();
        let removed = store
            .delete(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.keys(), Vec::<String>::new());
    }
}
