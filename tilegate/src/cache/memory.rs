//! Process-wide shared memory store with FIFO eviction.
//!
//! A single [`SharedMemoryCache`] is created at start-up and injected
//! into every cache. It keeps one inner tile map per cache id and bounds
//! the total payload bytes across all of them. Writes never evict;
//! reclamation happens in the background enforcement task
//! ([`EnforcementDaemon`](crate::cache::EnforcementDaemon)), which drains
//! the write history in FIFO order until the store fits.

use crate::cache::config::SharedMemoryConfig;
use crate::cache::daemon::EnforcementDaemon;
use crate::log::Logger;
use crate::{log_debug, log_warn};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Inner store for one cache id.
struct TileMap {
    tiles: RwLock<HashMap<String, Vec<u8>>>,
}

impl TileMap {
    fn new() -> Self {
        Self {
            tiles: RwLock::new(HashMap::new()),
        }
    }
}

/// One write, in insertion order.
///
/// `len` is the payload length observed at write time; eviction skips a
/// record whose length no longer matches the stored payload, so a stale
/// record cannot evict a re-written tile.
struct HistoryRecord {
    cache_id: String,
    tile_key: String,
    len: usize,
}

/// Write history and size accounting, guarded together by one lock.
struct Accounting {
    history: VecDeque<HistoryRecord>,
    size_bytes: usize,
}

/// Process-wide, size-bounded tile store shared by all caches.
///
/// Lock layout: a registry lock over `cache_id -> TileMap`, one lock per
/// inner map, and one lock for the write history plus the running size.
/// Lock order is registry, then inner map, then accounting; writers drop
/// the inner lock before touching the accounting lock, and no operation
/// holds two inner locks at once.
pub struct SharedMemoryCache {
    maps: RwLock<HashMap<String, Arc<TileMap>>>,
    accounting: Mutex<Accounting>,
    max_bytes: usize,
    enforce_interval: Duration,
    logger: Arc<dyn Logger>,
}

impl SharedMemoryCache {
    /// Create a new shared store.
    ///
    /// The enforcement task is not started here; call
    /// [`start_enforcement`](Self::start_enforcement) on the returned
    /// handle and keep the daemon alive for the life of the process.
    pub fn new(config: SharedMemoryConfig) -> Arc<Self> {
        Arc::new(Self {
            maps: RwLock::new(HashMap::new()),
            accounting: Mutex::new(Accounting {
                history: VecDeque::new(),
                size_bytes: 0,
            }),
            max_bytes: config.max_bytes,
            enforce_interval: config.enforce_interval,
            logger: config.logger,
        })
    }

    /// Start the periodic size enforcement task.
    ///
    /// Returns `None` when the configured interval is zero; a positive
    /// `max_bytes` with no enforcement is almost certainly a
    /// misconfiguration, so that combination logs a warning.
    pub fn start_enforcement(self: &Arc<Self>) -> Option<EnforcementDaemon> {
        if self.enforce_interval.is_zero() {
            if self.max_bytes > 0 {
                log_warn!(
                    self.logger,
                    "SharedMemoryCache: max size is {} Bytes but the enforce interval is zero, \
                     no size enforcement will run",
                    self.max_bytes
                );
            }
            return None;
        }

        Some(EnforcementDaemon::start(
            Arc::clone(self),
            self.enforce_interval,
        ))
    }

    /// Look up a tile payload.
    pub fn read(&self, cache_id: &str, tile_key: &str) -> Option<Vec<u8>> {
        let map = {
            let maps = self.maps.read().unwrap();
            maps.get(cache_id).cloned()?
        };

        let tiles = map.tiles.read().unwrap();
        tiles.get(tile_key).cloned()
    }

    /// Store a tile payload, creating the inner map on first use.
    ///
    /// Accounting debits the length of any payload previously stored at
    /// this key, appends a history record and credits the new length.
    pub fn write(&self, cache_id: &str, tile_key: &str, data: Vec<u8>) {
        let map = self.map_for(cache_id);

        let (old_len, new_len) = {
            let mut tiles = map.tiles.write().unwrap();
            let old_len = tiles.get(tile_key).map(Vec::len).unwrap_or(0);
            let new_len = data.len();
            tiles.insert(tile_key.to_string(), data);
            (old_len, new_len)
        };

        let mut acc = self.accounting.lock().unwrap();
        acc.size_bytes = acc.size_bytes.saturating_sub(old_len);
        acc.history.push_back(HistoryRecord {
            cache_id: cache_id.to_string(),
            tile_key: tile_key.to_string(),
            len: new_len,
        });
        acc.size_bytes += new_len;
    }

    /// Whether the store is at or above its configured ceiling.
    ///
    /// Used by disk preload to stop early.
    pub fn max_size_reached(&self) -> bool {
        let acc = self.accounting.lock().unwrap();
        acc.size_bytes >= self.max_bytes
    }

    /// Evict tiles in write order until the store fits its ceiling.
    ///
    /// Holds the accounting lock for the whole loop; each victim briefly
    /// takes the registry lock to resolve its inner map and then that
    /// map's lock to remove the payload. Records pointing at missing maps
    /// or tiles are consumed silently; records whose stored length no
    /// longer matches the current payload are stale and skipped.
    pub fn enforce_size(&self) {
        log_debug!(self.logger, "SharedMemoryCache: enforce_size() called...");

        let mut acc = self.accounting.lock().unwrap();

        while acc.size_bytes > self.max_bytes {
            let Some(record) = acc.history.pop_front() else {
                break;
            };

            let map = {
                let maps = self.maps.read().unwrap();
                maps.get(&record.cache_id).cloned()
            };

            let Some(map) = map else {
                log_debug!(
                    self.logger,
                    "SharedMemoryCache: map [{}] not found, cannot delete tile to free up space",
                    record.cache_id
                );
                continue;
            };

            let removed = {
                let mut tiles = map.tiles.write().unwrap();
                match tiles.get(&record.tile_key) {
                    Some(data) if data.len() == record.len => {
                        tiles.remove(&record.tile_key);
                        true
                    }
                    // Overwritten since this record was appended; the
                    // newer record owns the current payload.
                    Some(_) => false,
                    None => false,
                }
            };

            if removed {
                acc.size_bytes = acc.size_bytes.saturating_sub(record.len);
                log_debug!(
                    self.logger,
                    "SharedMemoryCache: deleted tile [{}] from map [{}], recovered {} Bytes",
                    record.tile_key,
                    record.cache_id,
                    record.len
                );
            }
        }
    }

    /// Current sum of stored payload lengths.
    pub fn size_bytes(&self) -> usize {
        self.accounting.lock().unwrap().size_bytes
    }

    /// Configured byte ceiling.
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Configured enforcement period.
    pub fn enforce_interval(&self) -> Duration {
        self.enforce_interval
    }

    /// Whether a tile is currently stored.
    pub fn contains(&self, cache_id: &str, tile_key: &str) -> bool {
        let map = {
            let maps = self.maps.read().unwrap();
            maps.get(cache_id).cloned()
        };
        match map {
            Some(map) => map.tiles.read().unwrap().contains_key(tile_key),
            None => false,
        }
    }

    /// Number of tiles stored under one cache id.
    pub fn tile_count(&self, cache_id: &str) -> usize {
        let map = {
            let maps = self.maps.read().unwrap();
            maps.get(cache_id).cloned()
        };
        match map {
            Some(map) => map.tiles.read().unwrap().len(),
            None => 0,
        }
    }

    fn map_for(&self, cache_id: &str) -> Arc<TileMap> {
        {
            let maps = self.maps.read().unwrap();
            if let Some(map) = maps.get(cache_id) {
                return Arc::clone(map);
            }
        }

        let mut maps = self.maps.write().unwrap();
        if !maps.contains_key(cache_id) {
            log_debug!(
                self.logger,
                "SharedMemoryCache: map [{cache_id}] did not exist, created map"
            );
        }
        Arc::clone(
            maps.entry(cache_id.to_string())
                .or_insert_with(|| Arc::new(TileMap::new())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::config::SharedMemoryConfig;

    fn store(max_bytes: usize) -> Arc<SharedMemoryCache> {
        SharedMemoryCache::new(SharedMemoryConfig::new(max_bytes))
    }

    #[test]
    fn test_read_from_unknown_map_is_not_found() {
        let store = store(1024);
        assert_eq!(store.read("m/osm", "a.png"), None);
    }

    #[test]
    fn test_write_and_read() {
        let store = store(1024);
        store.write("m/osm", "a.png", vec![1, 2, 3]);

        assert_eq!(store.read("m/osm", "a.png"), Some(vec![1, 2, 3]));
        assert_eq!(store.size_bytes(), 3);
        assert_eq!(store.tile_count("m/osm"), 1);
    }

    #[test]
    fn test_cache_ids_are_isolated() {
        let store = store(1024);
        store.write("m/osm", "a.png", vec![1]);
        store.write("m/topo", "a.png", vec![2]);

        assert_eq!(store.read("m/osm", "a.png"), Some(vec![1]));
        assert_eq!(store.read("m/topo", "a.png"), Some(vec![2]));
        assert_eq!(store.size_bytes(), 2);
    }

    #[test]
    fn test_overwrite_replaces_payload_and_accounting() {
        let store = store(1024);
        store.write("m/osm", "a.png", vec![0; 10]);
        store.write("m/osm", "a.png", vec![0; 4]);

        assert_eq!(store.read("m/osm", "a.png"), Some(vec![0; 4]));
        assert_eq!(store.size_bytes(), 4);
        assert_eq!(store.tile_count("m/osm"), 1);
    }

    #[test]
    fn test_max_size_reached() {
        let store = store(10);
        assert!(!store.max_size_reached());

        store.write("m/osm", "a.png", vec![0; 10]);
        assert!(store.max_size_reached());
    }

    #[test]
    fn test_enforce_size_noop_under_limit() {
        let store = store(100);
        store.write("m/osm", "a.png", vec![0; 10]);

        store.enforce_size();

        assert!(store.contains("m/osm", "a.png"));
        assert_eq!(store.size_bytes(), 10);
    }

    #[test]
    fn test_enforce_size_evicts_in_fifo_order() {
        let store = store(10);
        store.write("m/osm", "a.png", vec![0; 4]);
        store.write("m/osm", "b.png", vec![0; 4]);
        store.write("m/osm", "c.png", vec![0; 4]);
        store.write("m/osm", "d.png", vec![0; 4]);
        assert_eq!(store.size_bytes(), 16);

        store.enforce_size();

        assert!(store.size_bytes() <= 10);
        assert!(!store.contains("m/osm", "a.png"));
        assert!(!store.contains("m/osm", "b.png"));
        assert!(store.contains("m/osm", "c.png"));
        assert!(store.contains("m/osm", "d.png"));
    }

    #[test]
    fn test_enforce_size_drains_across_cache_ids() {
        let store = store(5);
        store.write("m/osm", "a.png", vec![0; 4]);
        store.write("m/topo", "b.png", vec![0; 4]);

        store.enforce_size();

        assert!(!store.contains("m/osm", "a.png"));
        assert!(store.contains("m/topo", "b.png"));
        assert_eq!(store.size_bytes(), 4);
    }

    #[test]
    fn test_stale_record_does_not_evict_rewritten_tile() {
        let store = store(5);
        store.write("m/osm", "a.png", vec![0; 4]);
        // Overwrite with a different length; the first record is now stale.
        store.write("m/osm", "a.png", vec![0; 6]);
        assert_eq!(store.size_bytes(), 6);

        store.enforce_size();

        // The stale 4-byte record must be skipped, the 6-byte record
        // then evicts the current payload.
        assert!(!store.contains("m/osm", "a.png"));
        assert_eq!(store.size_bytes(), 0);
    }

    #[test]
    fn test_size_accounting_matches_stored_payloads() {
        let store = store(10);
        store.write("m/osm", "a.png", vec![0; 4]);
        store.write("m/osm", "b.png", vec![0; 4]);
        store.write("m/osm", "a.png", vec![0; 2]);
        store.write("m/osm", "c.png", vec![0; 4]);

        store.enforce_size();

        let total: usize = ["a.png", "b.png", "c.png"]
            .iter()
            .filter_map(|key| store.read("m/osm", key))
            .map(|data| data.len())
            .sum();
        assert_eq!(store.size_bytes(), total);
        assert!(store.size_bytes() <= 10);
    }

    #[test]
    fn test_enforce_stops_when_history_is_exhausted() {
        let store = store(0);
        store.write("m/osm", "a.png", vec![0; 4]);

        store.enforce_size();
        // History drained; a second run must not underflow or panic.
        store.enforce_size();

        assert_eq!(store.size_bytes(), 0);
        assert_eq!(store.tile_count("m/osm"), 0);
    }

    #[test]
    fn test_start_enforcement_disabled_with_zero_interval() {
        let store = SharedMemoryCache::new(
            SharedMemoryConfig::new(1024).with_enforce_interval(Duration::ZERO),
        );
        assert!(store.start_enforcement().is_none());
    }

    #[test]
    fn test_concurrent_writers_keep_accounting_consistent() {
        let store = store(usize::MAX);
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store.write("m/osm", &format!("{worker}-{i}.png"), vec![0; 8]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.size_bytes(), 4 * 50 * 8);
        assert_eq!(store.tile_count("m/osm"), 200);
    }
}
