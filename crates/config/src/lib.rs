//! Tunables for the storage engine.
//!
//! Everything here can be set in code through the `with_*` builders or read
//! from the environment with [`EngineConfig::from_env`]:
//!
//! ```text
//! LSM_DATA_DIR        data directory                  (default: "data")
//! LSM_MEMTABLE_BYTES  rotate the memtable above this  (default: 4096)
//! LSM_WAL_SYNC        fsync every WAL append          (default: "true")
//! LSM_L0_TRIGGER      L0 compaction trigger           (default: 4, 0 = disabled)
//! LSM_L1_TRIGGER      L1 compaction trigger           (default: 10, 0 = disabled)
//! LSM_MAX_LEVEL       number of levels                (default: 7)
//! ```
//!
//! Unparsable values fall back to the default.

use std::path::PathBuf;

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_MEMTABLE_MAX_BYTES: usize = 4096;
pub const DEFAULT_L0_COMPACTION_TRIGGER: usize = 4;
pub const DEFAULT_L1_COMPACTION_TRIGGER: usize = 10;
pub const DEFAULT_MAX_LEVEL: usize = 7;

/// Engine settings. See the crate docs for the defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// The active memtable is rotated once its size exceeds this many bytes.
    pub memtable_max_bytes: usize,
    /// fsync the WAL after every append.
    pub wal_sync: bool,
    /// Compact level 0 into level 1 once it holds this many tables.
    pub l0_compaction_trigger: usize,
    /// Compact level 1 into level 2 once it holds this many tables.
    pub l1_compaction_trigger: usize,
    /// Triggers for level 2 onwards; index 0 is level 2. Missing entries
    /// mean the level is never compacted automatically.
    pub higher_level_triggers: Vec<usize>,
    /// Number of levels. The last level, `max_level - 1`, is never compacted.
    pub max_level: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memtable_max_bytes: DEFAULT_MEMTABLE_MAX_BYTES,
            wal_sync: true,
            l0_compaction_trigger: DEFAULT_L0_COMPACTION_TRIGGER,
            l1_compaction_trigger: DEFAULT_L1_COMPACTION_TRIGGER,
            higher_level_triggers: Vec::new(),
            max_level: DEFAULT_MAX_LEVEL,
        }
    }
}

impl EngineConfig {
    pub fn with_memtable_max_bytes(mut self, bytes: usize) -> Self {
        self.memtable_max_bytes = bytes;
        self
    }

    pub fn with_wal_sync(mut self, sync: bool) -> Self {
        self.wal_sync = sync;
        self
    }

    pub fn with_l0_compaction_trigger(mut self, trigger: usize) -> Self {
        self.l0_compaction_trigger = trigger;
        self
    }

    pub fn with_l1_compaction_trigger(mut self, trigger: usize) -> Self {
        self.l1_compaction_trigger = trigger;
        self
    }

    pub fn with_higher_level_triggers(mut self, triggers: Vec<usize>) -> Self {
        self.higher_level_triggers = triggers;
        self
    }

    /// Values below 1 are raised to 1.
    pub fn with_max_level(mut self, levels: usize) -> Self {
        self.max_level = levels.max(1);
        self
    }

    /// File count at which `level` is compacted into `level + 1`.
    ///
    /// `None` if the level is never compacted automatically: its trigger is
    /// 0, it has no configured trigger, or it is the last level.
    pub fn compaction_trigger(&self, level: usize) -> Option<usize> {
        if level + 1 >= self.max_level {
            return None;
        }
        let trigger = match level {
            0 => self.l0_compaction_trigger,
            1 => self.l1_compaction_trigger,
            n => self.higher_level_triggers.get(n - 2).copied().unwrap_or(0),
        };
        (trigger > 0).then_some(trigger)
    }

    /// Reads the data directory and settings from `LSM_*` variables.
    pub fn from_env() -> (PathBuf, Self) {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> (PathBuf, Self)
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parsed = |key: &str, default: usize| -> usize {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };

        let data_dir = lookup("LSM_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
        let wal_sync = lookup("LSM_WAL_SYNC")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.wal_sync);

        let config = Self::default()
            .with_memtable_max_bytes(parsed("LSM_MEMTABLE_BYTES", defaults.memtable_max_bytes))
            .with_wal_sync(wal_sync)
            .with_l0_compaction_trigger(parsed("LSM_L0_TRIGGER", defaults.l0_compaction_trigger))
            .with_l1_compaction_trigger(parsed("LSM_L1_TRIGGER", defaults.l1_compaction_trigger))
            .with_max_level(parsed("LSM_MAX_LEVEL", defaults.max_level));

        (PathBuf::from(data_dir), config)
    }
}
