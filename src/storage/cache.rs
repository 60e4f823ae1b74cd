//! Content-addressed reference cache.
//!
//! Entries are keyed by the selection fingerprint and move through
//! Absent -> Building -> Ready. Builds happen in a scratch sibling under an
//! exclusive advisory lock; the `ready` marker is written last, so a
//! directory without it is a crashed build and gets torn down on the next
//! resolve. Readers hold a shared lock on the entry for the duration of a
//! run, which keeps the pruner off live entries.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use fs2::FileExt;
use humansize::{format_size, BINARY};

use crate::{HymetError, Result};

/// Artifact names inside one entry.
pub const REFERENCES_FASTA: &str = "references.fasta";
pub const REFERENCE_TAXONOMY: &str = "reference_taxonomy.tsv";
pub const ALIGNMENT_INDEX: &str = "alignment.index";
pub const CACHE_META: &str = "cache.meta";
const READY_MARKER: &str = "ready";
const LOCK_SUFFIX: &str = ".lock";
const SCRATCH_SUFFIX: &str = ".building";

/// A resolved, ready cache entry. Holds a shared lock until dropped.
#[derive(Debug)]
pub struct CacheHandle {
    dir: PathBuf,
    _lock: File,
}

impl CacheHandle {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn references_fasta(&self) -> PathBuf {
        self.dir.join(REFERENCES_FASTA)
    }

    pub fn reference_taxonomy(&self) -> PathBuf {
        self.dir.join(REFERENCE_TAXONOMY)
    }

    pub fn alignment_index(&self) -> PathBuf {
        self.dir.join(ALIGNMENT_INDEX)
    }
}

pub struct ReferenceCache {
    root: PathBuf,
}

impl ReferenceCache {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, fingerprint: &str) -> PathBuf {
        self.root.join(fingerprint)
    }

    fn lock_path(&self, fingerprint: &str) -> PathBuf {
        self.root.join(format!("{}{}", fingerprint, LOCK_SUFFIX))
    }

    /// Resolve an entry, building it when absent. `builder` receives a
    /// scratch directory and must materialise every artifact there.
    ///
    /// Concurrent resolvers on the same fingerprint serialise on the entry
    /// lock: one builds, the rest wait and then reuse.
    pub fn resolve<F>(&self, fingerprint: &str, force_rebuild: bool, builder: F) -> Result<CacheHandle>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let dir = self.entry_dir(fingerprint);
        let lock_file = File::create(self.lock_path(fingerprint))?;

        // Fast path: ready and no invalidation requested
        if !force_rebuild && entry_complete(&dir) {
            lock_file
                .lock_shared()
                .map_err(|e| HymetError::Cache(format!("shared lock: {}", e)))?;
            // The entry could have been pruned between the check and the lock
            if entry_complete(&dir) {
                tracing::debug!(fingerprint, "cache hit");
                return Ok(CacheHandle {
                    dir,
                    _lock: lock_file,
                });
            }
            FileExt::unlock(&lock_file)
                .map_err(|e| HymetError::Cache(format!("unlock: {}", e)))?;
        }

        lock_file
            .lock_exclusive()
            .map_err(|e| HymetError::Cache(format!("exclusive lock: {}", e)))?;

        if force_rebuild && dir.exists() {
            tracing::info!(fingerprint, "invalidating cache entry before rebuild");
            fs::remove_dir_all(&dir)?;
        }

        // Re-check under the lock: another process may have built meanwhile
        if !entry_complete(&dir) {
            if dir.exists() {
                // Crashed build: no marker, tear it down
                tracing::warn!(fingerprint, "removing stale unfinished cache entry");
                fs::remove_dir_all(&dir)?;
            }

            let scratch = self
                .root
                .join(format!("{}{}", fingerprint, SCRATCH_SUFFIX));
            if scratch.exists() {
                fs::remove_dir_all(&scratch)?;
            }
            fs::create_dir_all(&scratch)?;

            tracing::info!(fingerprint, "building cache entry");
            match builder(&scratch) {
                Ok(()) => {}
                Err(e) => {
                    let _ = fs::remove_dir_all(&scratch);
                    return Err(HymetError::Cache(format!("builder failed: {}", e)));
                }
            }

            for artifact in [REFERENCES_FASTA, REFERENCE_TAXONOMY, ALIGNMENT_INDEX] {
                if !scratch.join(artifact).exists() {
                    let _ = fs::remove_dir_all(&scratch);
                    return Err(HymetError::Cache(format!(
                        "builder did not produce {}",
                        artifact
                    )));
                }
            }

            fs::rename(&scratch, &dir)?;
            // Marker goes last: its presence certifies a complete entry
            fs::write(dir.join(READY_MARKER), b"")?;
        }

        // Downgrade to a shared read lock for the rest of the run
        lock_file
            .lock_shared()
            .map_err(|e| HymetError::Cache(format!("lock downgrade: {}", e)))?;
        Ok(CacheHandle {
            dir,
            _lock: lock_file,
        })
    }

    /// Evict Ready entries by age and cumulative size. Entries whose lock is
    /// held (a build, or a reader mid-run) are skipped. Returns the evicted
    /// fingerprints.
    pub fn prune(&self, max_age: Option<std::time::Duration>, max_total_bytes: Option<u64>) -> Result<Vec<String>> {
        #[derive(Debug)]
        struct Entry {
            fingerprint: String,
            dir: PathBuf,
            created: SystemTime,
            bytes: u64,
        }

        let mut entries = Vec::new();
        for item in fs::read_dir(&self.root)? {
            let item = item?;
            let path = item.path();
            let name = item.file_name().to_string_lossy().into_owned();
            if !path.is_dir() || name.ends_with(SCRATCH_SUFFIX) {
                continue;
            }
            if !path.join(READY_MARKER).exists() {
                // Building (or crashed); resolve handles crashed ones
                continue;
            }
            let created = fs::metadata(path.join(READY_MARKER))?
                .modified()
                .unwrap_or(SystemTime::UNIX_EPOCH);
            entries.push(Entry {
                bytes: dir_size(&path)?,
                fingerprint: name,
                dir: path,
                created,
            });
        }

        // Oldest first
        entries.sort_by_key(|e| e.created);

        let now = SystemTime::now();
        let mut total: u64 = entries.iter().map(|e| e.bytes).sum();
        let mut evicted = Vec::new();

        for entry in entries {
            let too_old = max_age.is_some_and(|limit| {
                now.duration_since(entry.created)
                    .map(|age| age > limit)
                    .unwrap_or(false)
            });
            let over_budget = max_total_bytes.is_some_and(|limit| total > limit);
            if !too_old && !over_budget {
                continue;
            }

            let lock_file = File::create(self.lock_path(&entry.fingerprint))?;
            if lock_file.try_lock_exclusive().is_err() {
                tracing::info!(fingerprint = %entry.fingerprint, "entry in use, skipping");
                continue;
            }

            tracing::info!(
                fingerprint = %entry.fingerprint,
                size = %format_size(entry.bytes, BINARY),
                "evicting cache entry"
            );
            // Marker first, so a crash mid-delete leaves a Building-shaped
            // directory the next resolve cleans up. The lock file stays:
            // unlinking it would let a waiter lock the orphaned inode while
            // a newcomer locks a fresh one.
            let _ = fs::remove_file(entry.dir.join(READY_MARKER));
            fs::remove_dir_all(&entry.dir)?;
            total = total.saturating_sub(entry.bytes);
            evicted.push(entry.fingerprint);
        }

        Ok(evicted)
    }
}

/// Ready means the marker exists and every artifact is in place; a missing
/// artifact (for example a deleted alignment.index) demotes the entry to
/// Absent so the next resolve rebuilds it.
fn entry_complete(dir: &Path) -> bool {
    dir.join(READY_MARKER).exists()
        && [REFERENCES_FASTA, REFERENCE_TAXONOMY, ALIGNMENT_INDEX]
            .iter()
            .all(|artifact| dir.join(artifact).exists())
}

fn dir_size(dir: &Path) -> Result<u64> {
    let mut total = 0;
    for item in fs::read_dir(dir)? {
        let item = item?;
        let meta = item.metadata()?;
        if meta.is_dir() {
            total += dir_size(&item.path())?;
        } else {
            total += meta.len();
        }
    }
    Ok(total)
}
