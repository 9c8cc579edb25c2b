//! Disk tier: TTL-checked reads, tree writes, sweeping and preloading.

use crate::cache::memory::SharedMemoryCache;
use crate::cache::types::{CacheError, SweepReport, TilePath};
use crate::log::Logger;
use crate::{log_debug, log_error, log_info, log_warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// Persistent tile storage beneath one cache root directory.
///
/// Files live at the paths produced by the path deriver, so the tier
/// itself never interprets coordinates; it only reads, writes and walks.
pub struct DiskTier {
    root: PathBuf,
    ttl: Duration,
    logger: Arc<dyn Logger>,
    log_prefix: String,
}

impl DiskTier {
    /// Create a disk tier rooted at `root` with the given time-to-live.
    pub fn new(root: PathBuf, ttl: Duration, logger: Arc<dyn Logger>, log_prefix: String) -> Self {
        Self {
            root,
            ttl,
            logger,
            log_prefix,
        }
    }

    /// The cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read a tile from disk.
    ///
    /// Zero-length files count as a miss; files whose modification time
    /// is strictly older than the ttl are rejected as expired. A file
    /// aged exactly the ttl is still served.
    pub fn read(&self, full_path: &Path) -> Result<Vec<u8>, CacheError> {
        let data = fs::read(full_path)?;

        if data.is_empty() {
            return Err(CacheError::EmptyFile);
        }

        let modified = fs::metadata(full_path)?.modified()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);

        if age > self.ttl {
            return Err(CacheError::Expired { age, ttl: self.ttl });
        }

        Ok(data)
    }

    /// Write a tile, creating the directory tree as needed.
    ///
    /// Directories are created mode 0755 and the file mode 0644. The
    /// write is not atomic with respect to concurrent reads; duplicate
    /// in-flight writes to the same key race with last-writer-wins,
    /// which is benign while payloads are content-stable.
    pub fn write(&self, tile: &TilePath, data: &[u8]) -> Result<(), CacheError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            fs::DirBuilder::new()
                .recursive(true)
                .mode(0o755)
                .create(&tile.dir)?;
        }
        #[cfg(not(unix))]
        fs::create_dir_all(&tile.dir)?;

        fs::write(&tile.full_path, data)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tile.full_path, fs::Permissions::from_mode(0o644))?;
        }

        log_debug!(
            self.logger,
            "{}: Tile with {} Bytes saved to {}",
            self.log_prefix,
            data.len(),
            tile.full_path.display()
        );

        Ok(())
    }

    /// Walk the cache tree, removing outdated files and then-empty
    /// directories.
    ///
    /// A missing root is a no-op. Walk errors abort the sweep and are
    /// logged, never raised; the next run picks up where this one
    /// stopped.
    pub fn sweep(&self) -> SweepReport {
        log_info!(self.logger, "{}: Validating cache...", self.log_prefix);

        let start = Instant::now();
        let mut report = SweepReport::default();

        if !self.root.exists() {
            log_debug!(
                self.logger,
                "{}: Cache directory not yet created. Aborting cleanup!",
                self.log_prefix
            );
            return report;
        }

        if let Err(e) = self.sweep_dir(&self.root, &mut report) {
            log_warn!(
                self.logger,
                "{}: Could not clean cache, reason: {e}",
                self.log_prefix
            );
        }
        self.remove_dir_if_empty(&self.root);

        report.elapsed = start.elapsed();
        log_info!(
            self.logger,
            "{}: Cache validated and cleaned! (Size before: {} Bytes, size now: {} Bytes, \
             {} Bytes removed, took {:?})",
            self.log_prefix,
            report.inspected_bytes,
            report.inspected_bytes - report.removed_bytes,
            report.removed_bytes,
            report.elapsed
        );

        report
    }

    fn sweep_dir(&self, dir: &Path, report: &mut SweepReport) -> std::io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let metadata = entry.metadata()?;

            if metadata.is_dir() {
                self.sweep_dir(&path, report)?;
                self.remove_dir_if_empty(&path);
                continue;
            }

            let size = metadata.len();
            report.inspected_bytes += size;

            if self.is_outdated(metadata.modified()?) {
                log_debug!(
                    self.logger,
                    "{}: [{}] is outdated. Removing file from cache...",
                    self.log_prefix,
                    path.display()
                );
                match fs::remove_file(&path) {
                    Ok(()) => report.removed_bytes += size,
                    Err(_) => log_warn!(
                        self.logger,
                        "{}: Could not remove [{}]",
                        self.log_prefix,
                        path.display()
                    ),
                }
            }
        }

        Ok(())
    }

    /// Walk the cache tree and copy every tile into the shared memory
    /// store under `cache_id`, keyed by its path.
    ///
    /// Stops early with [`CacheError::SharedMemoryFull`] as soon as the
    /// store reports it is at or above its ceiling. Returns the number
    /// of tiles stored and the bytes walked.
    pub fn preload(
        &self,
        store: &SharedMemoryCache,
        cache_id: &str,
    ) -> Result<(usize, u64), CacheError> {
        log_info!(
            self.logger,
            "{}: Preloading cached tiles into memory map...",
            self.log_prefix
        );

        if !self.root.exists() {
            log_debug!(
                self.logger,
                "{}: Cache directory not yet created. Aborting preload!",
                self.log_prefix
            );
            return Ok((0, 0));
        }

        let start = Instant::now();
        let mut tiles_stored = 0usize;
        let mut total_bytes = 0u64;

        let result = self.preload_dir(&self.root, store, cache_id, &mut tiles_stored, &mut total_bytes);

        match result {
            Ok(()) => {
                log_info!(
                    self.logger,
                    "{}: Cache data preloaded into memory! {} Bytes loaded, {} tiles stored, \
                     took {:?}",
                    self.log_prefix,
                    total_bytes,
                    tiles_stored,
                    start.elapsed()
                );
                Ok((tiles_stored, total_bytes))
            }
            Err(CacheError::SharedMemoryFull) => {
                log_warn!(
                    self.logger,
                    "{}: Shared memory store exceeded its max size during preload... \
                     Preload aborted after {} tiles.",
                    self.log_prefix,
                    tiles_stored
                );
                Err(CacheError::SharedMemoryFull)
            }
            Err(e) => {
                log_warn!(
                    self.logger,
                    "{}: Could not perform preload, reason: {e}",
                    self.log_prefix
                );
                Err(e)
            }
        }
    }

    fn preload_dir(
        &self,
        dir: &Path,
        store: &SharedMemoryCache,
        cache_id: &str,
        tiles_stored: &mut usize,
        total_bytes: &mut u64,
    ) -> Result<(), CacheError> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            if entry.metadata()?.is_dir() {
                self.preload_dir(&path, store, cache_id, tiles_stored, total_bytes)?;
                continue;
            }

            if store.max_size_reached() {
                return Err(CacheError::SharedMemoryFull);
            }

            match fs::read(&path) {
                Ok(data) => {
                    *total_bytes += data.len() as u64;
                    *tiles_stored += 1;
                    store.write(cache_id, &path.to_string_lossy(), data);
                }
                Err(e) => log_warn!(
                    self.logger,
                    "{}: Could not preload file {}, reason: {e}",
                    self.log_prefix,
                    path.display()
                ),
            }
        }

        Ok(())
    }

    /// Remove the entire cache tree.
    ///
    /// Refuses suspicious roots (empty, `/`, `C:\`). A missing root is
    /// a no-op.
    pub fn wipe(&self) -> Result<(), CacheError> {
        log_info!(self.logger, "{}: Wiping cache...", self.log_prefix);

        let root_string = self.root.to_string_lossy();
        if is_path_dangerous(&root_string) {
            log_error!(
                self.logger,
                "{}: Cache could not be wiped, illegal cache root: [{root_string}]",
                self.log_prefix
            );
            return Err(CacheError::DangerousPath(root_string.into_owned()));
        }

        if !self.root.exists() {
            return Ok(());
        }

        let start = Instant::now();
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {
                log_info!(
                    self.logger,
                    "{}: Cache successfully wiped! (took {:?})",
                    self.log_prefix,
                    start.elapsed()
                );
                Ok(())
            }
            Err(e) => {
                log_warn!(
                    self.logger,
                    "{}: Cache could not be wiped, reason: {e}",
                    self.log_prefix
                );
                Err(e.into())
            }
        }
    }

    fn is_outdated(&self, modified: SystemTime) -> bool {
        SystemTime::now()
            .duration_since(modified)
            .map(|age| age > self.ttl)
            .unwrap_or(false)
    }

    fn remove_dir_if_empty(&self, dir: &Path) {
        let is_empty = fs::read_dir(dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if is_empty && fs::remove_dir(dir).is_ok() {
            log_debug!(
                self.logger,
                "{}: Removed folder [{}]",
                self.log_prefix,
                dir.display()
            );
        }
    }
}

fn is_path_dangerous(path: &str) -> bool {
    let trimmed = path.trim();
    trimmed.is_empty() || trimmed == "/" || trimmed == "C:\\"
}
