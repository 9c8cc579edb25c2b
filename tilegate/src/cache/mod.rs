//! Three-tier read-through tile cache.
//!
//! The lookup pipeline walks the shared memory store, the disk tier and
//! finally the upstream origin; every miss resolution writes the tile
//! back into the tiers nearer the client. A process-wide
//! [`SharedMemoryCache`] bounds memory across all caches with FIFO
//! eviction driven by a background enforcement task.

mod config;
mod daemon;
mod disk;
mod memory;
mod origin;
mod path;
mod service;
mod stats;
mod types;
mod validate;

pub use config::{SharedMemoryConfig, TileCacheConfig, DEFAULT_HTTP_TIMEOUT};
pub use daemon::{EnforcementDaemon, StatsLogDaemon};
pub use disk::DiskTier;
pub use memory::SharedMemoryCache;
pub use origin::OriginFetcher;
pub use path::{derive_tile_path, is_valid_coordinate, sanitize_component};
pub use service::{RequestId, TileCache};
pub use stats::{CacheStats, StatsSnapshot};
pub use types::{CacheError, ServeError, SweepReport, TilePath};
pub use validate::is_valid_tile;
