//! Compaction: merges every table of a level into one table one level down.
//!
//! Level `n` is compacted once it holds as many tables as
//! [`EngineConfig::compaction_trigger`](config::EngineConfig::compaction_trigger)
//! says. The new table is prepended to level `n + 1`, the consumed tables
//! are dropped from the manifest in the same snapshot, and only then are
//! their files deleted. The last level is never compacted.

use anyhow::{ensure, Context, Result};
use sstable::{Compactor, TombstonePolicy};
use std::sync::Arc;
use tracing::{info, warn};

use crate::ids::next_file_id;
use crate::Engine;

impl Engine {
    /// Compacts `level` into `level + 1` regardless of its trigger, then
    /// runs any compaction the target level now calls for.
    ///
    /// A no-op for an empty level.
    ///
    /// # Errors
    ///
    /// `level` must be below `max_level - 1`.
    pub fn compact_level(&self, level: usize) -> Result<()> {
        let _maintenance = self.maintenance.lock();
        self.compact_level_locked(level)?;
        self.check_and_compact(level + 1)
    }

    /// Starting at `level`, compacts each level whose table count reached
    /// its trigger, moving down one level at a time. Stops at the first level
    /// that needs nothing. Caller holds the maintenance lock.
    pub(crate) fn check_and_compact(&self, level: usize) -> Result<()> {
        let mut level = level;
        while level + 1 < self.config.max_level {
            let trigger = match self.config.compaction_trigger(level) {
                Some(t) => t,
                None => break,
            };
            if self.manifest.read().file_count(level) < trigger {
                break;
            }
            self.compact_level_locked(level)?;
            level += 1;
        }
        Ok(())
    }

    fn compact_level_locked(&self, level: usize) -> Result<()> {
        let target = level + 1;
        ensure!(
            target < self.config.max_level,
            "level {level} is the last level and cannot be compacted"
        );

        let (inputs, older_data_below) = {
            let manifest = self.manifest.read();
            let below = (target..manifest.levels()).any(|l| manifest.file_count(l) > 0);
            (manifest.level(level), below)
        };
        if inputs.is_empty() {
            return Ok(());
        }

        // Tombstones must survive while an older value could sit below.
        let policy = if older_data_below {
            TombstonePolicy::Retain
        } else {
            TombstonePolicy::Drop
        };

        let oldest_first: Vec<_> = inputs.iter().rev().cloned().collect();
        let output_path = sstable::table_path(&self.dir, next_file_id());
        let output = Compactor::new(policy)
            .compact(&oldest_first, &output_path)
            .with_context(|| format!("failed to compact level {level}"))?
            .map(Arc::new);
        drop(oldest_first);

        let output_entries = output.as_ref().map_or(0, |t| t.len());
        let applied = self
            .manifest
            .write()
            .apply_compact(level, &inputs, target, output);
        if let Err(e) = applied {
            let _ = std::fs::remove_file(&output_path);
            return Err(e.context(format!("failed to record compaction of level {level}")));
        }

        for table in &inputs {
            if let Err(e) = std::fs::remove_file(table.path()) {
                warn!(table = %table.path().display(), error = %e, "failed to delete compacted table");
            }
        }

        info!(
            level,
            target,
            inputs = inputs.len(),
            entries = output_entries,
            ?policy,
            "compacted level"
        );
        Ok(())
    }
}
