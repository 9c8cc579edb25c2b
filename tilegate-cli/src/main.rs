//! Tilegate CLI - runs one tile cache behind an HTTP listener.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tilegate::cache::{
    SharedMemoryCache, SharedMemoryConfig, TileCache, TileCacheConfig,
};
use tilegate::log::TracingLogger;
use tilegate::server::create_router;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Read-through caching proxy for map image tiles.
#[derive(Debug, Parser)]
#[command(name = "tilegate", version = tilegate::VERSION)]
struct Args {
    /// Listen port
    #[arg(long, default_value_t = 9001)]
    port: u16,

    /// Route segments, comma separated (URL prefix and disk prefix)
    #[arg(long, value_delimiter = ',', default_value = "maptilecache,osm")]
    route: Vec<String>,

    /// Upstream URL template with {s}, {x}, {y}, {z} and optionally
    /// {apiKey} placeholders
    #[arg(long, default_value = "http://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png")]
    url_scheme: String,

    /// Query parameter names that become extra path segments
    #[arg(long, value_delimiter = ',')]
    structure_param: Vec<String>,

    /// On-disk time-to-live in hours
    #[arg(long, default_value_t = 24 * 90)]
    ttl_hours: u64,

    /// Forward client headers to the upstream
    #[arg(long)]
    forward_headers: bool,

    /// API key substituted into {apiKey}
    #[arg(long, default_value = "")]
    api_key: String,

    /// Outbound request timeout in seconds
    #[arg(long, default_value_t = 6)]
    http_timeout_secs: u64,

    /// Shared memory ceiling in bytes; 0 disables the memory tier
    #[arg(long, default_value_t = 256 * 1024 * 1024)]
    memory_max_bytes: usize,

    /// Period of the memory size enforcement task in seconds
    #[arg(long, default_value_t = 30)]
    enforce_interval_secs: u64,

    /// Period of stats log lines in seconds; 0 disables them
    #[arg(long, default_value_t = 0)]
    stats_interval_secs: u64,

    /// Directory the cache tree lives under
    #[arg(long, default_value = ".")]
    cache_dir: PathBuf,

    /// Remove outdated tiles from disk before serving
    #[arg(long)]
    sweep_on_start: bool,

    /// Warm the memory tier from disk before serving
    #[arg(long)]
    preload: bool,

    /// Verbose (debug) logging
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(args.verbose);

    let logger = Arc::new(TracingLogger::new());

    let shared_memory = (args.memory_max_bytes > 0).then(|| {
        SharedMemoryCache::new(
            SharedMemoryConfig::new(args.memory_max_bytes)
                .with_enforce_interval(Duration::from_secs(args.enforce_interval_secs))
                .with_logger(logger.clone()),
        )
    });
    let _enforcement = shared_memory
        .as_ref()
        .and_then(|store| store.start_enforcement());

    let mut config = TileCacheConfig::new(args.route, args.url_scheme)
        .with_port(args.port)
        .with_structure_params(args.structure_param)
        .with_ttl(Duration::from_secs(args.ttl_hours * 3600))
        .with_forward_headers(args.forward_headers)
        .with_http_timeout(Duration::from_secs(args.http_timeout_secs))
        .with_api_key(args.api_key)
        .with_stats_log_interval(Duration::from_secs(args.stats_interval_secs))
        .with_base_dir(args.cache_dir)
        .with_logger(logger);

    if let Some(store) = shared_memory {
        config = config.with_shared_memory(store);
    }

    let cache = match TileCache::new(config) {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            error!("Could not initialize cache: {e}");
            std::process::exit(1);
        }
    };

    if args.sweep_on_start {
        cache.sweep();
    }
    if args.preload {
        cache.preload_shared_memory();
    }

    let router = create_router([Arc::clone(&cache)]);

    let addr = format!("127.0.0.1:{}", cache.port());
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {addr}: {e}");
            std::process::exit(1);
        }
    };

    info!(
        "Map tile cache listening at http://{addr}/{}/",
        cache.route_string()
    );

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {e}");
        std::process::exit(1);
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tilegate=debug,tilegate_cli=debug"
    } else {
        "tilegate=info,tilegate_cli=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
