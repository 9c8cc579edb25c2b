//! Cache configuration types.

use crate::cache::memory::SharedMemoryCache;
use crate::log::{Logger, NoOpLogger};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default deadline for outbound tile requests.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(6);

/// Configuration for a single tile cache.
///
/// A cache is bound to one URL route prefix and one upstream URL
/// template. Several caches may share one process and one
/// [`SharedMemoryCache`].
///
/// # Example
///
/// ```
/// use tilegate::cache::TileCacheConfig;
/// use std::time::Duration;
///
/// let config = TileCacheConfig::new(
///     ["m", "osm"],
///     "http://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png",
/// )
/// .with_ttl(Duration::from_secs(90 * 24 * 3600))
/// .with_port(9001);
/// ```
#[derive(Clone)]
pub struct TileCacheConfig {
    /// Listen port the embedding listener should bind for this cache
    pub port: u16,
    /// URL path prefix, also the disk subdirectory prefix
    pub route: Vec<String>,
    /// Upstream URL template with `{s}`, `{x}`, `{y}`, `{z}` and
    /// optionally `{apiKey}` placeholders
    pub url_scheme: String,
    /// Query parameter names whose sanitized values become extra path
    /// segments before `z/y`
    pub structure_params: Vec<String>,
    /// Maximum on-disk age of a tile
    pub ttl: Duration,
    /// Propagate client headers to the upstream request
    pub forward_headers: bool,
    /// Process-wide shared memory store, if any
    pub shared_memory: Option<Arc<SharedMemoryCache>>,
    /// Outbound request deadline; zero selects [`DEFAULT_HTTP_TIMEOUT`]
    pub http_timeout: Duration,
    /// Secret substituted into `{apiKey}`
    pub api_key: String,
    /// Log destination
    pub logger: Arc<dyn Logger>,
    /// Period of the stats log daemon; zero disables it
    pub stats_log_interval: Duration,
    /// Directory the cache tree lives under
    pub base_dir: PathBuf,
}

impl TileCacheConfig {
    /// Create a configuration for the given route and upstream template.
    ///
    /// Defaults: 24 h ttl, no header forwarding, no shared memory, 6 s
    /// HTTP timeout, silent logger, stats logging disabled, cache tree
    /// under the working directory.
    pub fn new<I, S>(route: I, url_scheme: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            port: 0,
            route: route.into_iter().map(Into::into).collect(),
            url_scheme: url_scheme.into(),
            structure_params: Vec::new(),
            ttl: Duration::from_secs(24 * 3600),
            forward_headers: false,
            shared_memory: None,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            api_key: String::new(),
            logger: Arc::new(NoOpLogger),
            stats_log_interval: Duration::ZERO,
            base_dir: PathBuf::from("."),
        }
    }

    /// Set the listen port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the structure parameter names.
    pub fn with_structure_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.structure_params = params.into_iter().map(Into::into).collect();
        self
    }

    /// Set the on-disk time-to-live.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Enable or disable forwarding of client headers to the upstream.
    pub fn with_forward_headers(mut self, forward: bool) -> Self {
        self.forward_headers = forward;
        self
    }

    /// Attach the process-wide shared memory store.
    pub fn with_shared_memory(mut self, store: Arc<SharedMemoryCache>) -> Self {
        self.shared_memory = Some(store);
        self
    }

    /// Set the outbound request deadline.
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Set the API key substituted into `{apiKey}`.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Set the logger.
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Set the stats log period; zero disables periodic stats logging.
    pub fn with_stats_log_interval(mut self, interval: Duration) -> Self {
        self.stats_log_interval = interval;
        self
    }

    /// Set the directory the cache tree lives under.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }
}

/// Configuration for the process-wide shared memory store.
#[derive(Clone)]
pub struct SharedMemoryConfig {
    /// Ceiling on the sum of stored payload lengths
    pub max_bytes: usize,
    /// Period of the background size enforcement task; zero disables it
    pub enforce_interval: Duration,
    /// Log destination
    pub logger: Arc<dyn Logger>,
}

impl SharedMemoryConfig {
    /// Create a configuration with the given byte ceiling.
    ///
    /// Defaults: 30 s enforcement interval, silent logger.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            enforce_interval: Duration::from_secs(30),
            logger: Arc::new(NoOpLogger),
        }
    }

    /// Set the enforcement period; zero disables the background task.
    pub fn with_enforce_interval(mut self, interval: Duration) -> Self {
        self.enforce_interval = interval;
        self
    }

    /// Set the logger.
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_cache_config_defaults() {
        let config = TileCacheConfig::new(["m", "osm"], "http://{s}.example.org/{z}/{x}/{y}.png");

        assert_eq!(config.route, vec!["m".to_string(), "osm".to_string()]);
        assert_eq!(config.ttl, Duration::from_secs(24 * 3600));
        assert_eq!(config.http_timeout, DEFAULT_HTTP_TIMEOUT);
        assert!(!config.forward_headers);
        assert!(config.shared_memory.is_none());
        assert!(config.structure_params.is_empty());
        assert!(config.api_key.is_empty());
        assert_eq!(config.stats_log_interval, Duration::ZERO);
        assert_eq!(config.base_dir, PathBuf::from("."));
    }

    #[test]
    fn test_tile_cache_config_builder() {
        let config = TileCacheConfig::new(["tiles"], "http://example.org/{z}/{x}/{y}.png")
            .with_port(9001)
            .with_structure_params(["style", "layer"])
            .with_ttl(Duration::from_secs(60))
            .with_forward_headers(true)
            .with_http_timeout(Duration::from_secs(2))
            .with_api_key("secret")
            .with_stats_log_interval(Duration::from_secs(300))
            .with_base_dir("/tmp/tiles");

        assert_eq!(config.port, 9001);
        assert_eq!(config.structure_params, vec!["style", "layer"]);
        assert_eq!(config.ttl, Duration::from_secs(60));
        assert!(config.forward_headers);
        assert_eq!(config.http_timeout, Duration::from_secs(2));
        assert_eq!(config.api_key, "secret");
        assert_eq!(config.stats_log_interval, Duration::from_secs(300));
        assert_eq!(config.base_dir, PathBuf::from("/tmp/tiles"));
    }

    #[test]
    fn test_shared_memory_config_defaults() {
        let config = SharedMemoryConfig::new(1024);
        assert_eq!(config.max_bytes, 1024);
        assert_eq!(config.enforce_interval, Duration::from_secs(30));
    }
}
