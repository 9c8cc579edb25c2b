//! Per-cache serving statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Byte counters for one cache, split by the tier that resolved the
/// request.
///
/// Counters are atomic so request tasks can update them through a shared
/// reference and the stats daemon can observe them without tearing.
#[derive(Debug, Default)]
pub struct CacheStats {
    bytes_from_memory: AtomicU64,
    bytes_from_disk: AtomicU64,
    bytes_from_origin: AtomicU64,
}

impl CacheStats {
    /// Create a zeroed statistics tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record bytes served from the shared memory store.
    pub fn record_memory_bytes(&self, len: usize) {
        self.bytes_from_memory.fetch_add(len as u64, Ordering::Relaxed);
    }

    /// Record bytes served from the disk tier.
    pub fn record_disk_bytes(&self, len: usize) {
        self.bytes_from_disk.fetch_add(len as u64, Ordering::Relaxed);
    }

    /// Record bytes served from the upstream origin.
    pub fn record_origin_bytes(&self, len: usize) {
        self.bytes_from_origin.fetch_add(len as u64, Ordering::Relaxed);
    }

    /// Take a consistent-enough snapshot of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bytes_served_from_memory: self.bytes_from_memory.load(Ordering::Relaxed),
            bytes_served_from_disk: self.bytes_from_disk.load(Ordering::Relaxed),
            bytes_served_from_origin: self.bytes_from_origin.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`CacheStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub bytes_served_from_memory: u64,
    pub bytes_served_from_disk: u64,
    pub bytes_served_from_origin: u64,
}

impl StatsSnapshot {
    /// Bytes served from any cache tier (memory + disk).
    pub fn bytes_served_from_cache(&self) -> u64 {
        self.bytes_served_from_memory + self.bytes_served_from_disk
    }

    /// One-line summary with cache/origin percentages.
    pub fn summary(&self) -> String {
        let cache = self.bytes_served_from_cache();
        let origin = self.bytes_served_from_origin;
        let total = cache + origin;

        let (cache_pct, origin_pct) = if total > 0 {
            (
                100.0 * cache as f64 / total as f64,
                100.0 * origin as f64 / total as f64,
            )
        } else {
            (0.0, 0.0)
        };

        format!(
            "Served from Origin: {origin} Bytes ({origin_pct:.2}%), \
             Served from Cache: {cache} Bytes ({cache_pct:.2}%, \
             (HDD: {} Bytes, RAM: {} Bytes))",
            self.bytes_served_from_disk, self.bytes_served_from_memory
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stats_are_zero() {
        let snapshot = CacheStats::new().snapshot();

        assert_eq!(snapshot.bytes_served_from_memory, 0);
        assert_eq!(snapshot.bytes_served_from_disk, 0);
        assert_eq!(snapshot.bytes_served_from_origin, 0);
        assert_eq!(snapshot.bytes_served_from_cache(), 0);
    }

    #[test]
    fn test_counters_accumulate() {
        let stats = CacheStats::new();
        stats.record_memory_bytes(10);
        stats.record_memory_bytes(5);
        stats.record_disk_bytes(20);
        stats.record_origin_bytes(40);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.bytes_served_from_memory, 15);
        assert_eq!(snapshot.bytes_served_from_disk, 20);
        assert_eq!(snapshot.bytes_served_from_origin, 40);
    }

    #[test]
    fn test_cache_bytes_is_memory_plus_disk() {
        let stats = CacheStats::new();
        stats.record_memory_bytes(3);
        stats.record_disk_bytes(7);
        stats.record_origin_bytes(100);

        assert_eq!(stats.snapshot().bytes_served_from_cache(), 10);
    }

    #[test]
    fn test_summary_percentages() {
        let stats = CacheStats::new();
        stats.record_disk_bytes(75);
        stats.record_origin_bytes(25);

        let summary = stats.snapshot().summary();
        assert!(summary.contains("Origin: 25 Bytes (25.00%)"));
        assert!(summary.contains("Cache: 75 Bytes (75.00%"));
    }

    #[test]
    fn test_summary_with_no_traffic() {
        let summary = CacheStats::new().snapshot().summary();
        assert!(summary.contains("Origin: 0 Bytes (0.00%)"));
    }

    #[test]
    fn test_updates_through_shared_reference() {
        use std::sync::Arc;

        let stats = Arc::new(CacheStats::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        stats.record_origin_bytes(1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(stats.snapshot().bytes_served_from_origin, 400);
    }
}
