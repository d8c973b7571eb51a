//! Per-wrapper cache statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of how a wrapped computation has used its cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Calls served from the cache.
    pub hits: u64,
    /// Calls that consulted the cache and had to compute.
    pub misses: u64,
    /// Calls where the revalidation hook skipped the cache read.
    pub bypasses: u64,
    /// Signed entries rejected because the checksum did not match.
    pub integrity_failures: u64,
    /// Entries that could not be decoded.
    pub decode_failures: u64,
    /// Reads that failed in the store and were treated as misses.
    pub read_errors: u64,
    /// Writes the store failed or did not acknowledge.
    pub write_failures: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0) over calls that consulted the cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Number of times the wrapped computation ran.
    pub fn computations(&self) -> u64 {
        self.misses + self.bypasses
    }
}

/// Lock-free counters behind [`CacheStats`].
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    bypasses: AtomicU64,
    integrity_failures: AtomicU64,
    decode_failures: AtomicU64,
    read_errors: AtomicU64,
    write_failures: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bypass(&self) {
        self.bypasses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn integrity_failure(&self) {
        self.integrity_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bypasses: self.bypasses.load(Ordering::Relaxed),
            integrity_failures: self.integrity_failures.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_recorder_snapshot() {
        let recorder = StatsRecorder::default();
        recorder.hit();
        recorder.miss();
        recorder.miss();
        recorder.bypass();
        recorder.integrity_failure();

        let stats = recorder.snapshot();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.computations(), 3);
        assert_eq!(stats.integrity_failures, 1);
        assert_eq!(stats.write_failures, 0);
    }
}
