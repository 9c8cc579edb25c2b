//! Per-route cache orchestration.
//!
//! [`TileCache`] ties the tiers together: it parses a request path,
//! walks memory, disk and origin in order, promotes on hits, schedules
//! write-behind on origin fetches and keeps the per-tier byte counters.

use crate::cache::config::{TileCacheConfig, DEFAULT_HTTP_TIMEOUT};
use crate::cache::daemon::StatsLogDaemon;
use crate::cache::disk::DiskTier;
use crate::cache::memory::SharedMemoryCache;
use crate::cache::origin::OriginFetcher;
use crate::cache::path::{derive_tile_path, is_valid_coordinate};
use crate::cache::stats::{CacheStats, StatsSnapshot};
use crate::cache::types::{CacheError, ServeError, SweepReport, TilePath};
use crate::log::Logger;
use crate::{log_debug, log_error, log_info, log_warn};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Short identifier correlating the log lines of one request.
#[derive(Clone, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    /// Next id from the process-wide counter, as 8 hex digits.
    pub fn next() -> Self {
        let counter = REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("{:08X}", counter & 0xFFFF_FFFF))
    }

    /// The string value of this id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self.0)
    }
}

/// One read-through cache bound to a route prefix and an upstream
/// template.
///
/// Immutable after construction apart from the statistics counters.
/// Lives until process exit.
pub struct TileCache {
    route: Vec<String>,
    route_string: String,
    structure_params: Vec<String>,
    port: u16,
    shared_memory: Option<Arc<SharedMemoryCache>>,
    disk: Arc<DiskTier>,
    fetcher: Arc<OriginFetcher>,
    stats: Arc<CacheStats>,
    logger: Arc<dyn Logger>,
    log_prefix: String,
    #[allow(dead_code)]
    stats_daemon: Option<StatsLogDaemon>,
}

impl TileCache {
    /// Build a cache from its configuration.
    ///
    /// Fails when the route is empty, the ttl is not strictly positive
    /// or the HTTP client cannot be constructed. Starts the stats log
    /// daemon when a positive interval is configured.
    pub fn new(config: TileCacheConfig) -> Result<Self, CacheError> {
        let start = Instant::now();

        if config.route.is_empty() {
            return Err(CacheError::InvalidConfig(
                "route invalid, must have at least one entry".to_string(),
            ));
        }
        if config.ttl.is_zero() {
            return Err(CacheError::InvalidConfig(
                "ttl must be strictly positive".to_string(),
            ));
        }

        let route_string = config.route.join("/");
        let log_prefix = format!("Cache[{route_string}]");

        let timeout = if config.http_timeout.is_zero() {
            DEFAULT_HTTP_TIMEOUT
        } else {
            config.http_timeout
        };
        log_debug!(config.logger, "{log_prefix}: Timeout: {timeout:?}");

        let cache_root = config
            .route
            .iter()
            .fold(config.base_dir.clone(), |path, segment| path.join(segment));

        let disk = Arc::new(DiskTier::new(
            cache_root,
            config.ttl,
            Arc::clone(&config.logger),
            log_prefix.clone(),
        ));

        let fetcher = Arc::new(OriginFetcher::new(
            config.url_scheme.clone(),
            config.api_key.clone(),
            config.forward_headers,
            timeout,
            Arc::clone(&config.logger),
            log_prefix.clone(),
        )?);

        let stats = Arc::new(CacheStats::new());

        let stats_daemon = if config.stats_log_interval.is_zero() {
            log_debug!(
                config.logger,
                "{log_prefix}: Will not log stats periodically, reason: stats interval not set"
            );
            None
        } else {
            Some(StatsLogDaemon::start(
                Arc::clone(&stats),
                Arc::clone(&config.logger),
                log_prefix.clone(),
                config.stats_log_interval,
            ))
        };

        let cache = Self {
            route: config.route,
            route_string,
            structure_params: config.structure_params,
            port: config.port,
            shared_memory: config.shared_memory,
            disk,
            fetcher,
            stats,
            logger: config.logger,
            log_prefix,
            stats_daemon,
        };

        log_info!(
            cache.logger,
            "{}: New cache initialized on route /{}/ (took {:?})",
            cache.log_prefix,
            cache.route_string,
            start.elapsed()
        );

        Ok(cache)
    }

    /// The cache id: the route joined by `/`.
    pub fn route_string(&self) -> &str {
        &self.route_string
    }

    /// The configured listen port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Snapshot of the per-tier byte counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Serve one tile request.
    ///
    /// `path` is the full URL path; it must carry at least
    /// `5 + route length` `/`-separated segments, the trailing five
    /// being `s`, `z`, `y`, `x` and the empty segment of the terminal
    /// slash. Walks memory, then disk (promoting the tile into memory),
    /// then the origin (scheduling write-behind into both tiers).
    pub async fn serve(
        &self,
        path: &str,
        query: &HashMap<String, String>,
        headers: &[(String, String)],
    ) -> Result<Vec<u8>, ServeError> {
        let start = Instant::now();
        let request_id = RequestId::next();
        let req_prefix = format!("[reqID {request_id}] ");

        log_debug!(
            self.logger,
            "{}: {req_prefix}Received request for path [{path}]",
            self.log_prefix
        );

        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() < 5 + self.route.len() {
            log_error!(
                self.logger,
                "{}: Bad Request: not enough arguments in route [{path}]",
                self.log_prefix
            );
            return Err(ServeError::BadRequest);
        }

        let s = segments[1 + self.route.len()];
        let z = segments[2 + self.route.len()];
        let y = segments[3 + self.route.len()];
        let x = segments[4 + self.route.len()];

        if !is_valid_coordinate(z) || !is_valid_coordinate(y) || !is_valid_coordinate(x) {
            log_error!(
                self.logger,
                "{}: Bad Request: invalid tile coordinates in route [{path}]",
                self.log_prefix
            );
            return Err(ServeError::BadRequest);
        }

        log_debug!(
            self.logger,
            "{}: {req_prefix}Params found in route: s=[{s}], x=[{x}], y=[{y}], z=[{z}]",
            self.log_prefix
        );

        let tile = derive_tile_path(
            self.disk.root(),
            &self.structure_params,
            query,
            x,
            y,
            z,
        );
        let key = tile.key();

        if let Some(data) = self.memory_load(&req_prefix, &key) {
            self.stats.record_memory_bytes(data.len());
            log_debug!(
                self.logger,
                "{}: {req_prefix}Served {} Bytes from memory (took {:?})",
                self.log_prefix,
                data.len(),
                start.elapsed()
            );
            return Ok(data);
        }

        if let Some(data) = self.disk_load(&req_prefix, &tile).await {
            self.stats.record_disk_bytes(data.len());
            self.memory_store(&req_prefix, &key, data.clone());
            log_debug!(
                self.logger,
                "{}: {req_prefix}Served {} Bytes from disk (took {:?})",
                self.log_prefix,
                data.len(),
                start.elapsed()
            );
            return Ok(data);
        }

        log_debug!(
            self.logger,
            "{}: {req_prefix}Tile for x=[{x}], y=[{y}], z=[{z}] not cached, sending request to server...",
            self.log_prefix
        );

        match self
            .fetcher
            .fetch(&req_prefix, x, y, z, s, query, headers)
            .await
        {
            Ok(data) => {
                self.stats.record_origin_bytes(data.len());
                self.schedule_write_behind(&req_prefix, &tile, &key, &data);
                log_debug!(
                    self.logger,
                    "{}: {req_prefix}Fetched tile for x=[{x}], y=[{y}], z=[{z}] from server \
                     ({} Bytes, took {:?})",
                    self.log_prefix,
                    data.len(),
                    start.elapsed()
                );
                Ok(data)
            }
            Err(e) => {
                log_warn!(
                    self.logger,
                    "{}: Could not fetch tile for x=[{x}], y=[{y}], z=[{z}], reason: {e}",
                    self.log_prefix
                );
                Err(ServeError::NotFound)
            }
        }
    }

    /// Sweep the disk tier, removing outdated tiles.
    pub fn sweep(&self) -> SweepReport {
        self.disk.sweep()
    }

    /// Remove the whole disk tree for this cache.
    pub fn wipe(&self) -> Result<(), CacheError> {
        self.disk.wipe()
    }

    /// Warm the shared memory store from the disk tree.
    ///
    /// A full store stops the preload early; that and any walk failure
    /// are logged by the disk tier and swallowed here.
    pub fn preload_shared_memory(&self) {
        let Some(store) = &self.shared_memory else {
            log_debug!(
                self.logger,
                "{}: SharedMemoryCache not set, cannot preload memory map",
                self.log_prefix
            );
            return;
        };

        let _ = self.disk.preload(store, &self.route_string);
    }

    fn memory_load(&self, req_prefix: &str, key: &str) -> Option<Vec<u8>> {
        let Some(store) = &self.shared_memory else {
            log_debug!(
                self.logger,
                "{}: {req_prefix}SharedMemoryCache not set, cannot load tile with key [{key}]",
                self.log_prefix
            );
            return None;
        };

        let data = store.read(&self.route_string, key);
        match &data {
            Some(data) => log_debug!(
                self.logger,
                "{}: {req_prefix}Loaded tile ({} Bytes) from the memory map with key [{key}]",
                self.log_prefix,
                data.len()
            ),
            None => log_debug!(
                self.logger,
                "{}: {req_prefix}Tile for key [{key}] not found in memory map",
                self.log_prefix
            ),
        }
        data
    }

    fn memory_store(&self, req_prefix: &str, key: &str, data: Vec<u8>) {
        let Some(store) = &self.shared_memory else {
            return;
        };

        store.write(&self.route_string, key, data);
        log_debug!(
            self.logger,
            "{}: {req_prefix}Tile saved to the memory map with key [{key}]",
            self.log_prefix
        );
    }

    async fn disk_load(&self, req_prefix: &str, tile: &TilePath) -> Option<Vec<u8>> {
        let disk = Arc::clone(&self.disk);
        let full_path = tile.full_path.clone();

        let result = tokio::task::spawn_blocking(move || disk.read(&full_path)).await;

        match result {
            Ok(Ok(data)) => Some(data),
            Ok(Err(e)) => {
                log_debug!(
                    self.logger,
                    "{}: {req_prefix}Could not load tile from [{}], reason: {e}",
                    self.log_prefix,
                    tile.full_path.display()
                );
                None
            }
            Err(e) => {
                log_warn!(
                    self.logger,
                    "{}: {req_prefix}Disk read task failed: {e}",
                    self.log_prefix
                );
                None
            }
        }
    }

    /// Queue the disk and memory write-backs for a fetched tile without
    /// blocking the response.
    fn schedule_write_behind(&self, req_prefix: &str, tile: &TilePath, key: &str, data: &[u8]) {
        let disk = Arc::clone(&self.disk);
        let logger = Arc::clone(&self.logger);
        let log_prefix = self.log_prefix.clone();
        let tile = tile.clone();
        let payload = data.to_vec();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = disk.write(&tile, &payload) {
                log_error!(logger, "{log_prefix}: Could not save tile, reason: {e}");
            }
        });

        if let Some(store) = &self.shared_memory {
            let store = Arc::clone(store);
            let cache_id = self.route_string.clone();
            let key = key.to_string();
            let payload = data.to_vec();
            let logger = Arc::clone(&self.logger);
            let log_prefix = self.log_prefix.clone();
            let req_prefix = req_prefix.to_string();
            tokio::spawn(async move {
                store.write(&cache_id, &key, payload);
                log_debug!(
                    logger,
                    "{log_prefix}: {req_prefix}Tile saved to the memory map with key [{key}]"
                );
            });
        }
    }
}
