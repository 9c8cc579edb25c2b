//! Tilegate - read-through caching proxy for map image tiles.
//!
//! A client requests a tile by its pyramid coordinates (`z`, `x`, `y`
//! plus a subdomain token `s`); the proxy answers with the PNG bytes,
//! fetching and persisting them from an upstream tile server on first
//! access. Lookups walk three tiers - a process-wide bounded memory
//! store, a TTL-checked disk tree and the HTTP origin - and every miss
//! resolution is written back into the tiers nearer the client.
//!
//! # High-level API
//!
//! ```no_run
//! use std::sync::Arc;
//! use tilegate::cache::{
//!     SharedMemoryCache, SharedMemoryConfig, TileCache, TileCacheConfig,
//! };
//! use tilegate::server::create_router;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SharedMemoryCache::new(SharedMemoryConfig::new(256 * 1024 * 1024));
//! let _enforcement = store.start_enforcement();
//!
//! let cache = Arc::new(TileCache::new(
//!     TileCacheConfig::new(
//!         ["m", "osm"],
//!         "http://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png",
//!     )
//!     .with_shared_memory(store),
//! )?);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:9001").await?;
//! axum::serve(listener, create_router([cache])).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod log;
pub mod server;

/// Version of the tilegate library and CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
