//! Core types for the tile cache.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Derived filesystem location of a tile.
///
/// `full_path` doubles as the canonical tile key across all tiers:
/// the shared memory store, the disk tier and the serve pipeline all
/// address a tile by this path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePath {
    /// Directory holding the tile file
    pub dir: PathBuf,
    /// Full path including the `<x>.png` file name
    pub full_path: PathBuf,
}

impl TilePath {
    /// The canonical string key for this tile.
    pub fn key(&self) -> String {
        self.full_path.to_string_lossy().into_owned()
    }
}

/// Cache-related errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error during cache operations
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A cached file with zero-length content, treated as a miss
    #[error("cached file is empty")]
    EmptyFile,

    /// A cached file older than the configured time-to-live
    #[error("tile is too old: age {age:?} exceeds ttl {ttl:?}")]
    Expired { age: Duration, ttl: Duration },

    /// The upstream request could not be performed
    #[error("upstream request failed: {0}")]
    OriginRequest(String),

    /// The upstream answered with a non-200 status
    #[error("upstream returned bad status code: {0}")]
    OriginStatus(u16),

    /// The upstream body failed the PNG signature check
    #[error("invalid response body received")]
    InvalidTile,

    /// The shared memory store reported it is at capacity
    #[error("shared memory store exceeded its maximum size")]
    SharedMemoryFull,

    /// Invalid cache configuration
    #[error("invalid cache configuration: {0}")]
    InvalidConfig(String),

    /// Refusal to run a destructive operation on a suspicious root
    #[error("refusing to operate on dangerous path [{0}]")]
    DangerousPath(String),
}

/// User-visible outcome of a failed serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ServeError {
    /// The request path carried too few segments or malformed coordinates
    #[error("bad request")]
    BadRequest,

    /// All tiers failed to produce the tile
    #[error("not found")]
    NotFound,
}

/// Outcome of a disk sweep run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepReport {
    /// Total bytes of all regular files inspected
    pub inspected_bytes: u64,
    /// Bytes reclaimed by removing outdated files
    pub removed_bytes: u64,
    /// Wall-clock duration of the sweep
    pub elapsed: Duration,
}
