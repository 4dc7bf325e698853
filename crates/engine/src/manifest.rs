//! # Manifest - level metadata
//!
//! Tracks which SSTable files make up each level so the engine can rebuild
//! its read path after a restart.
//!
//! ## Files
//!
//! ```text
//! CURRENT                          -> "MANIFEST-00000001708600000000000001\n"
//! MANIFEST-00000001708600000000000001
//!     # LSM manifest snapshot
//!     # Format: L<level>:<filename>, newest first within a level
//!     L0:sstable-00000001708600000000000007.sst
//!     L0:sstable-00000001708600000000000003.sst
//!     L1:sstable-00000001708600000000000002.sst
//! ```
//!
//! Every change writes a complete new snapshot under a fresh name, fsyncs it,
//! and then swings `CURRENT` to it (write `CURRENT.tmp`, fsync, rename).
//! The change counts as durable once the rename is done. A crash before that
//! leaves the previous snapshot in force; the stray new one is removed at
//! the next startup.
//!
//! ## Ordering
//!
//! Every level list is newest first. Flushes prepend to level 0 and
//! compaction outputs are prepended to their target level, so a linear scan
//! of any level finds the most recent version of a key first.

use anyhow::{ensure, Context, Result};
use sstable::SSTable;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ids::{advance_past, next_file_id};

pub const CURRENT_FILE: &str = "CURRENT";
pub(crate) const CURRENT_TMP_FILE: &str = "CURRENT.tmp";
pub const MANIFEST_PREFIX: &str = "MANIFEST-";

/// Tables of every level, newest first within each level.
pub type Levels = Vec<Vec<Arc<SSTable>>>;

/// Recovery failures that mean the manifest cannot be trusted.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// `CURRENT` points at a snapshot that is not on disk.
    #[error("CURRENT names snapshot {name}, which does not exist")]
    MissingSnapshot { name: String },

    /// `CURRENT` or the snapshot does not parse.
    #[error("malformed manifest {name} at line {line}: {reason}")]
    Malformed {
        name: String,
        line: usize,
        reason: String,
    },
}

pub fn snapshot_file_name(id: u64) -> String {
    format!("{MANIFEST_PREFIX}{id:020}")
}

fn parse_snapshot_id(name: &str) -> Option<u64> {
    name.strip_prefix(MANIFEST_PREFIX)?.parse().ok()
}

/// In-memory level map plus the name of the snapshot it was loaded from.
pub struct Manifest {
    root: PathBuf,
    levels: Levels,
    snapshot: Option<String>,
}

impl Manifest {
    /// An empty manifest for a new database. Nothing is written until the
    /// first change.
    pub fn new<P: AsRef<Path>>(root: P, max_level: usize) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            levels: vec![Vec::new(); max_level.max(1)],
            snapshot: None,
        }
    }

    /// Loads the snapshot named by `CURRENT` under `root` and reopens every
    /// table it lists. No `CURRENT` means a new, empty database.
    ///
    /// # Errors
    ///
    /// [`ManifestError::MissingSnapshot`] if `CURRENT` names a file that is
    /// gone, [`ManifestError::Malformed`] if either file does not parse or a
    /// level is outside `0..max_level`, and any error from reopening a table.
    pub fn recover<P: AsRef<Path>>(root: P, max_level: usize) -> Result<Self> {
        let mut manifest = Self::new(root, max_level);
        let current_path = manifest.root.join(CURRENT_FILE);

        let current = match fs::read_to_string(&current_path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(root = %manifest.root.display(), "no CURRENT file, starting empty");
                return Ok(manifest);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", current_path.display()))
            }
        };

        let name = current.trim();
        let id = parse_snapshot_id(name).ok_or_else(|| ManifestError::Malformed {
            name: CURRENT_FILE.to_string(),
            line: 1,
            reason: format!("not a snapshot name: {name:?}"),
        })?;
        advance_past(id);

        let snapshot_path = manifest.root.join(name);
        let contents = match fs::read_to_string(&snapshot_path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ManifestError::MissingSnapshot {
                    name: name.to_string(),
                }
                .into())
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read {}", snapshot_path.display()))
            }
        };

        for (line_num, line) in contents.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let malformed = |reason: String| ManifestError::Malformed {
                name: name.to_string(),
                line: line_num + 1,
                reason,
            };

            let (level_str, filename) = trimmed
                .split_once(':')
                .ok_or_else(|| malformed("expected 'L<n>:<filename>'".to_string()))?;
            let level: usize = level_str
                .strip_prefix('L')
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| malformed(format!("bad level {level_str:?}")))?;
            if level >= manifest.levels.len() {
                return Err(malformed(format!(
                    "level {level} outside 0..{}",
                    manifest.levels.len()
                ))
                .into());
            }
            if let Some(id) = sstable::parse_table_id(Path::new(filename)) {
                advance_past(id);
            }

            let path = manifest.root.join(filename);
            let table = SSTable::open(&path)
                .with_context(|| format!("manifest {name} lists {filename}, which failed to open"))?;
            manifest.levels[level].push(Arc::new(table));
        }

        manifest.snapshot = Some(name.to_string());
        info!(
            snapshot = name,
            tables = manifest.total_files(),
            "recovered manifest"
        );
        Ok(manifest)
    }

    /// Copy of the table list of `level`, newest first. Empty for levels
    /// outside the configured range.
    pub fn level(&self, level: usize) -> Vec<Arc<SSTable>> {
        self.levels.get(level).cloned().unwrap_or_default()
    }

    pub fn file_count(&self, level: usize) -> usize {
        self.levels.get(level).map_or(0, Vec::len)
    }

    /// Number of levels.
    pub fn levels(&self) -> usize {
        self.levels.len()
    }

    pub fn total_files(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    /// Name of the snapshot `CURRENT` points at, if any was written yet.
    pub fn snapshot_name(&self) -> Option<&str> {
        self.snapshot.as_deref()
    }

    /// Copy of every level at once.
    pub fn snapshot(&self) -> Levels {
        self.levels.clone()
    }

    /// File names of every table listed in any level.
    pub fn referenced_files(&self) -> HashSet<String> {
        self.levels
            .iter()
            .flatten()
            .map(|t| t.file_name().to_string())
            .collect()
    }

    /// Prepends `table` to `level` and persists a new snapshot.
    ///
    /// On error the in-memory state is unchanged.
    pub fn apply_flush(&mut self, level: usize, table: Arc<SSTable>) -> Result<()> {
        ensure!(level < self.levels.len(), "level {level} out of range");
        let mut next = self.levels.clone();
        next[level].insert(0, table);
        self.persist(next)
    }

    /// Removes `consumed` from `source_level`, prepends `output` (if any) to
    /// `target_level`, and persists both changes as one snapshot.
    ///
    /// On error the in-memory state is unchanged.
    pub fn apply_compact(
        &mut self,
        source_level: usize,
        consumed: &[Arc<SSTable>],
        target_level: usize,
        output: Option<Arc<SSTable>>,
    ) -> Result<()> {
        ensure!(source_level < self.levels.len(), "level {source_level} out of range");
        ensure!(target_level < self.levels.len(), "level {target_level} out of range");

        let mut next = self.levels.clone();
        next[source_level].retain(|t| !consumed.iter().any(|c| Arc::ptr_eq(c, t)));
        if let Some(table) = output {
            next[target_level].insert(0, table);
        }
        self.persist(next)
    }

    fn persist(&mut self, levels: Levels) -> Result<()> {
        let name = snapshot_file_name(next_file_id());
        let snapshot_path = self.root.join(&name);

        write_snapshot(&snapshot_path, &levels)
            .with_context(|| format!("failed to write {}", snapshot_path.display()))?;
        if let Err(e) = self.point_current_at(&name) {
            let _ = fs::remove_file(&snapshot_path);
            return Err(e);
        }

        let previous = self.snapshot.replace(name);
        self.levels = levels;
        debug!(
            snapshot = self.snapshot.as_deref().unwrap_or_default(),
            tables = self.total_files(),
            "persisted manifest"
        );

        if let Some(old) = previous {
            if let Err(e) = fs::remove_file(self.root.join(&old)) {
                warn!(snapshot = %old, error = %e, "failed to remove superseded manifest");
            }
        }
        Ok(())
    }

    fn point_current_at(&self, name: &str) -> Result<()> {
        let tmp_path = self.root.join(CURRENT_TMP_FILE);
        let current_path = self.root.join(CURRENT_FILE);
        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .with_context(|| format!("failed to create {}", tmp_path.display()))?;
            writeln!(f, "{name}")?;
            f.sync_all()?;
        }
        fs::rename(&tmp_path, &current_path)
            .with_context(|| format!("failed to install {}", current_path.display()))?;
        sync_dir(&self.root);
        Ok(())
    }
}

impl std::fmt::Debug for Manifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: Vec<usize> = self.levels.iter().map(Vec::len).collect();
        f.debug_struct("Manifest")
            .field("root", &self.root)
            .field("snapshot", &self.snapshot)
            .field("files_per_level", &counts)
            .finish()
    }
}

fn write_snapshot(path: &Path, levels: &Levels) -> io::Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    let mut buf = String::new();
    buf.push_str("# LSM manifest snapshot\n");
    buf.push_str("# Format: L<level>:<filename>, newest first within a level\n");
    for (level, tables) in levels.iter().enumerate() {
        for table in tables {
            buf.push_str(&format!("L{level}:{}\n", table.file_name()));
        }
    }
    f.write_all(buf.as_bytes())?;
    f.sync_all()
}

fn sync_dir(dir: &Path) {
    if let Ok(d) = File::open(dir) {
        let _ = d.sync_all();
    }
}
