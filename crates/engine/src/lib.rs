//! # Engine - LSM storage engine
//!
//! Ties the [`memtable`], [`wal`] and [`sstable`] crates together into an
//! embedded key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌──────────────────────────────────────────────────────┐
//! │                       ENGINE                         │
//! │                                                      │
//! │ write.rs → WAL append → active Memtable put          │
//! │              |                                       │
//! │              |  (size > memtable_max_bytes?)         │
//! │              v                                       │
//! │           rotate: new Memtable + new WAL segment,    │
//! │           old Memtable joins the pending list        │
//! │              |                                       │
//! │              v                                       │
//! │           flush → new L0 SSTable, WAL segment gone   │
//! │              |                                       │
//! │              |  (level count >= trigger?)            │
//! │              v                                       │
//! │           compact level n → one table in level n+1   │
//! │                                                      │
//! │ read.rs → active → pending (newest first)            │
//! │           → L0 → L1 → ... (first match wins)         │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module         | Purpose                                              |
//! |----------------|------------------------------------------------------|
//! | `lib.rs`       | `Engine` struct, `open`, `close`, accessors, `Drop`  |
//! | [`recovery`]   | WAL replay, stale file cleanup                       |
//! | `write`        | `put`, `delete`, rotation, flushing                  |
//! | `read`         | `get`                                                |
//! | `compaction`   | compaction triggers and level merges                 |
//! | [`manifest`]   | persistent level map behind the `CURRENT` pointer    |
//!
//! ## Concurrency
//!
//! `Engine` is `Send + Sync` and every operation takes `&self`.
//!
//! - One writer lock serializes WAL append, memtable update and rotation.
//! - The active memtable and the pending list are published together as one
//!   `Arc<MemState>`; rotation swaps that pointer, so a reader sees either
//!   the old or the new arrangement, never a mix.
//! - Flushes and compactions are serialized by a maintenance lock and never
//!   hold the writer lock, so writes to the new memtable proceed meanwhile.
//!
//! ## Crash Safety
//!
//! A write is acknowledged only after its WAL record is written. A WAL
//! segment is deleted only after the SSTable holding its data is recorded in
//! a durable manifest snapshot. Compaction inputs are deleted only after the
//! snapshot that drops them is durable.

mod compaction;
mod ids;
pub mod manifest;
mod read;
pub mod recovery;
mod write;

use anyhow::{ensure, Context, Result};
use config::EngineConfig;
use memtable::Memtable;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};
use wal::WalWriter;

pub use manifest::{Manifest, ManifestError};
pub use recovery::replay_all;

/// Maximum allowed key size in bytes (64 KiB).
pub const MAX_KEY_SIZE: usize = 64 * 1024;
/// Maximum allowed value size in bytes (10 MiB).
pub const MAX_VALUE_SIZE: usize = 10 * 1024 * 1024;

pub(crate) type SharedMemtable = Arc<RwLock<Memtable>>;

/// A rotated-out memtable waiting to be written as an SSTable.
pub(crate) struct FrozenMemtable {
    pub(crate) mem: SharedMemtable,
    /// The segment holding this generation's writes. `None` for data
    /// replayed at startup, whose segments are removed by `open`.
    pub(crate) segment: Option<PathBuf>,
    /// Open handle on `segment`, released before the segment is removed.
    pub(crate) wal: Mutex<Option<WalWriter>>,
    /// Set once the level-0 table is in the manifest.
    pub(crate) flushed: AtomicBool,
}

/// Everything a read needs to consult before the SSTables.
pub(crate) struct MemState {
    pub(crate) active: SharedMemtable,
    /// Newest first.
    pub(crate) pending: Vec<Arc<FrozenMemtable>>,
}

impl MemState {
    fn empty() -> Self {
        Self {
            active: Arc::new(RwLock::new(Memtable::new())),
            pending: Vec::new(),
        }
    }
}

/// An open database directory.
///
/// # Write Path
///
/// 1. Append the record to the active WAL segment.
/// 2. Apply it to the active memtable.
/// 3. If the memtable grew past `memtable_max_bytes`, rotate and flush.
///
/// # Read Path
///
/// 1. Active memtable, then pending memtables newest first.
/// 2. SSTables level by level, newest first within each level.
/// 3. First match wins; a tombstone reads as absent.
pub struct Engine {
    pub(crate) dir: PathBuf,
    pub(crate) config: EngineConfig,
    /// Active WAL segment. Held for the whole append + put + rotate sequence.
    pub(crate) writer: Mutex<WalWriter>,
    pub(crate) mem: RwLock<Arc<MemState>>,
    pub(crate) manifest: RwLock<Manifest>,
    /// Serializes flushes and compactions.
    pub(crate) maintenance: Mutex<()>,
}

impl Engine {
    /// Opens `dir` with [`EngineConfig::default`].
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::open_with(dir, EngineConfig::default())
    }

    /// Opens (or creates) the database in `dir`.
    ///
    /// # Recovery Steps
    ///
    /// 1. Load the manifest named by `CURRENT` and reopen its tables.
    /// 2. Delete temp files, unreferenced SSTables and stale snapshots.
    /// 3. Replay every WAL segment, oldest first, into one memtable.
    /// 4. Open a fresh WAL segment for new writes.
    /// 5. Flush the replayed memtable, if any, then delete the old segments.
    ///
    /// # Errors
    ///
    /// A missing or malformed manifest ([`ManifestError`]), a table that
    /// fails to reopen, or a WAL segment with an impossible record aborts
    /// the open. A WAL segment with a truncated tail does not.
    pub fn open_with<P: AsRef<Path>>(dir: P, config: EngineConfig) -> Result<Self> {
        ensure!(config.max_level >= 1, "max_level must be at least 1");
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create data directory {}", dir.display()))?;

        let manifest = Manifest::recover(&dir, config.max_level)?;
        recovery::remove_stale_files(&dir, &manifest);

        let (recovered, segments) = replay_all(&dir)?;
        let wal = write::new_segment(&dir, config.wal_sync)?;

        let engine = Self {
            dir,
            config,
            writer: Mutex::new(wal),
            mem: RwLock::new(Arc::new(MemState::empty())),
            manifest: RwLock::new(manifest),
            maintenance: Mutex::new(()),
        };

        let replayed = recovered.len();
        if !recovered.is_empty() {
            engine.flush_recovered(recovered)?;
        }
        for segment in &segments {
            wal::remove_segment(segment)
                .with_context(|| format!("failed to remove {}", segment.display()))?;
        }

        info!(
            dir = %engine.dir.display(),
            tables = engine.manifest.read().total_files(),
            replayed_entries = replayed,
            replayed_segments = segments.len(),
            "engine opened"
        );
        Ok(engine)
    }

    /// Flushes every memtable and syncs the active WAL segment.
    ///
    /// # Errors
    ///
    /// On a failed flush the data is still in the WAL and the next `open`
    /// recovers it.
    pub fn close(self) -> Result<()> {
        self.force_flush()?;
        self.writer.lock().sync_to_disk()?;
        info!(dir = %self.dir.display(), "engine closed");
        Ok(())
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of tables currently listed in `level`.
    #[must_use]
    pub fn level_file_count(&self, level: usize) -> usize {
        self.manifest.read().file_count(level)
    }

    /// File names of the tables in `level`, newest first.
    #[must_use]
    pub fn level_files(&self, level: usize) -> Vec<String> {
        self.manifest
            .read()
            .level(level)
            .iter()
            .map(|t| t.file_name().to_string())
            .collect()
    }

    #[must_use]
    pub fn total_files(&self) -> usize {
        self.manifest.read().total_files()
    }

    /// Rotated memtables not yet written out.
    #[must_use]
    pub fn pending_flush_count(&self) -> usize {
        self.mem.read().pending.len()
    }

    /// Estimated size of the active memtable in bytes.
    #[must_use]
    pub fn memtable_size(&self) -> usize {
        let state = self.mem.read().clone();
        let size = state.active.read().size();
        size
    }

    fn has_unflushed_data(&self) -> bool {
        let state = self.mem.read().clone();
        let active_dirty = !state.active.read().is_empty();
        active_dirty || !state.pending.is_empty()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.mem.read().clone();
        let (entries, size) = {
            let active = state.active.read();
            (active.len(), active.size())
        };
        let manifest = self.manifest.read();
        let counts: Vec<usize> = (0..manifest.levels()).map(|l| manifest.file_count(l)).collect();
        f.debug_struct("Engine")
            .field("dir", &self.dir)
            .field("memtable_entries", &entries)
            .field("memtable_size", &size)
            .field("memtable_max_bytes", &self.config.memtable_max_bytes)
            .field("pending_flush", &state.pending.len())
            .field("files_per_level", &counts)
            .field("snapshot", &manifest.snapshot_name())
            .finish()
    }
}

/// Best-effort flush on drop.
///
/// Errors are logged and otherwise ignored; the data is still in the WAL and
/// is recovered on the next open.
impl Drop for Engine {
    fn drop(&mut self) {
        if self.has_unflushed_data() {
            if let Err(e) = self.force_flush() {
                warn!(error = %e, "flush on drop failed, data remains in the wal");
            }
        }
    }
}

#[cfg(test)]
mod tests;
