//! Write path: `put`, `delete`, rotation, and flushing of pending memtables.

use anyhow::{ensure, Context, Result};
use memtable::{is_tombstone, Memtable, TOMBSTONE};
use parking_lot::{Mutex, RwLock};
use sstable::SSTable;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use wal::WalWriter;

use crate::ids::next_file_id;
use crate::{Engine, FrozenMemtable, MemState, MAX_KEY_SIZE, MAX_VALUE_SIZE};

/// Creates `wal-<id>.log` with a fresh id under `dir`.
pub(crate) fn new_segment(dir: &Path, sync: bool) -> Result<WalWriter> {
    let path = wal::segment_path(dir, next_file_id());
    WalWriter::create(&path, sync)
        .with_context(|| format!("failed to create wal segment {}", path.display()))
}

fn validate_key(key: &[u8]) -> Result<()> {
    ensure!(!key.is_empty(), "key must not be empty");
    ensure!(
        key.len() <= MAX_KEY_SIZE,
        "key too large: {} bytes (max {})",
        key.len(),
        MAX_KEY_SIZE
    );
    Ok(())
}

impl Engine {
    /// Inserts or overwrites `key`.
    ///
    /// Returns once the record is in the WAL and the memtable. If this write
    /// pushed the memtable over its limit, the memtable is rotated and
    /// flushed before returning; a flush failure is reported here even
    /// though the write itself is already durable in the WAL.
    ///
    /// # Errors
    ///
    /// Empty or oversized keys, oversized values, and a value equal to the
    /// tombstone marker are rejected before anything is written.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        validate_key(&key)?;
        ensure!(
            value.len() <= MAX_VALUE_SIZE,
            "value too large: {} bytes (max {})",
            value.len(),
            MAX_VALUE_SIZE
        );
        ensure!(!is_tombstone(&value), "value is reserved as the tombstone marker");
        self.write_record(key, value)
    }

    /// Deletes `key` by writing a tombstone that shadows older values.
    pub fn delete(&self, key: Vec<u8>) -> Result<()> {
        validate_key(&key)?;
        self.write_record(key, TOMBSTONE.to_vec())
    }

    fn write_record(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        let rotated = {
            let mut wal = self.writer.lock();
            wal.append(&key, &value).context("wal append failed")?;

            let state = self.mem.read().clone();
            let size = {
                let mut active = state.active.write();
                active.put(key, value);
                active.size()
            };

            if size > self.config.memtable_max_bytes {
                self.rotate(&mut wal)?;
                true
            } else {
                false
            }
        };

        if rotated {
            self.flush_pending()?;
        }
        Ok(())
    }

    /// Swaps in an empty memtable and a new WAL segment, moving the current
    /// memtable to the front of the pending list. Caller holds the writer
    /// lock.
    pub(crate) fn rotate(&self, wal: &mut WalWriter) -> Result<()> {
        let fresh = new_segment(&self.dir, self.config.wal_sync)?;
        let retired = std::mem::replace(wal, fresh);

        let mut guard = self.mem.write();
        let frozen = Arc::new(FrozenMemtable {
            mem: Arc::clone(&guard.active),
            segment: Some(retired.path().to_path_buf()),
            wal: Mutex::new(Some(retired)),
            flushed: AtomicBool::new(false),
        });
        let mut pending = Vec::with_capacity(guard.pending.len() + 1);
        pending.push(frozen);
        pending.extend(guard.pending.iter().cloned());

        let bytes = guard.active.read().size();
        *guard = Arc::new(MemState {
            active: Arc::new(RwLock::new(Memtable::new())),
            pending,
        });
        debug!(
            bytes,
            pending = guard.pending.len(),
            segment = %wal.path().display(),
            "rotated memtable"
        );
        Ok(())
    }

    /// Rotates the active memtable if it holds anything, then flushes every
    /// pending memtable.
    pub fn force_flush(&self) -> Result<()> {
        {
            let mut wal = self.writer.lock();
            let state = self.mem.read().clone();
            let dirty = !state.active.read().is_empty();
            if dirty {
                self.rotate(&mut wal)?;
            }
        }
        self.flush_pending()
    }

    /// Queues the memtable rebuilt from WAL replay and flushes it.
    pub(crate) fn flush_recovered(&self, recovered: Memtable) -> Result<()> {
        {
            let mut guard = self.mem.write();
            let mut pending = guard.pending.clone();
            pending.push(Arc::new(FrozenMemtable {
                mem: Arc::new(RwLock::new(recovered)),
                segment: None,
                wal: Mutex::new(None),
                flushed: AtomicBool::new(false),
            }));
            *guard = Arc::new(MemState {
                active: Arc::clone(&guard.active),
                pending,
            });
        }
        self.flush_pending()
    }

    /// Flushes pending memtables oldest first, then runs any compaction the
    /// new level-0 tables call for.
    ///
    /// Stops at the first failure, leaving that memtable and every newer
    /// one pending with their WAL segments intact. No newer memtable is
    /// written while an older one is still pending.
    pub(crate) fn flush_pending(&self) -> Result<()> {
        let _maintenance = self.maintenance.lock();
        loop {
            let oldest = self.mem.read().pending.last().cloned();
            match oldest {
                Some(frozen) => self.flush_one(&frozen)?,
                None => break,
            }
        }
        self.check_and_compact(0)
    }

    /// Writes one pending memtable to level 0, removes its WAL segment, and
    /// only then drops it from the pending list.
    ///
    /// A memtable whose table is already recorded but whose segment could
    /// not be removed stays pending and marked flushed; the next call
    /// retries the removal without writing a second table.
    fn flush_one(&self, frozen: &Arc<FrozenMemtable>) -> Result<()> {
        if !frozen.flushed.load(Ordering::Acquire) {
            self.write_level0(frozen)?;
            frozen.flushed.store(true, Ordering::Release);
        }

        if let Some(segment) = &frozen.segment {
            let removed = match frozen.wal.lock().take() {
                Some(writer) => writer.delete(),
                None => wal::remove_segment(segment),
            };
            removed.with_context(|| format!("failed to delete {}", segment.display()))?;
        }

        let mut guard = self.mem.write();
        let pending = guard
            .pending
            .iter()
            .filter(|p| !Arc::ptr_eq(p, frozen))
            .cloned()
            .collect();
        *guard = Arc::new(MemState {
            active: Arc::clone(&guard.active),
            pending,
        });
        Ok(())
    }

    fn write_level0(&self, frozen: &FrozenMemtable) -> Result<()> {
        let path = sstable::table_path(&self.dir, next_file_id());
        let table = {
            let mem = frozen.mem.read();
            if mem.is_empty() {
                return Ok(());
            }
            SSTable::from_memtable(&mem, &path)
                .with_context(|| format!("failed to write {}", path.display()))?
        };

        let entries = table.len();
        let applied = self.manifest.write().apply_flush(0, Arc::new(table));
        if let Err(e) = applied {
            let _ = std::fs::remove_file(&path);
            return Err(e.context("failed to record flushed table in manifest"));
        }
        info!(table = %path.display(), entries, "flushed memtable");
        Ok(())
    }
}
