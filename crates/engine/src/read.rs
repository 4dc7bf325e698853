//! Read path: `get`.

use anyhow::{Context, Result};
use memtable::is_tombstone;

use crate::Engine;

impl Engine {
    /// Looks up `key`.
    ///
    /// Consults the active memtable, then the pending memtables newest first,
    /// then the SSTables level by level. The first layer that holds the key
    /// decides; a tombstone there means `None` even if older layers still
    /// hold a value.
    ///
    /// # Errors
    ///
    /// An I/O failure or a corrupt block in any table consulted.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let found = match self.get_from_memtables(key) {
            Some(value) => Some(value),
            None => self.get_from_tables(key)?,
        };
        Ok(found.filter(|v| !is_tombstone(v)))
    }

    fn get_from_memtables(&self, key: &[u8]) -> Option<Vec<u8>> {
        let state = self.mem.read().clone();

        let active = state.active.read().get(key).map(<[u8]>::to_vec);
        if active.is_some() {
            return active;
        }
        state
            .pending
            .iter()
            .find_map(|frozen| frozen.mem.read().get(key).map(<[u8]>::to_vec))
    }

    fn get_from_tables(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let levels = self.manifest.read().snapshot();
        for (level, tables) in levels.iter().enumerate() {
            for table in tables {
                let value = table.get(key).with_context(|| {
                    format!("lookup failed in {} (level {level})", table.file_name())
                })?;
                if value.is_some() {
                    return Ok(value);
                }
            }
        }
        Ok(None)
    }
}
