//! Cold start: WAL replay and removal of files no snapshot needs.

use anyhow::{Context, Result};
use memtable::Memtable;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use wal::WalReader;

use crate::ids::advance_past;
use crate::manifest::{Manifest, CURRENT_TMP_FILE, MANIFEST_PREFIX};

/// Replays every WAL segment in `dir`, oldest first, into one memtable.
///
/// A later segment's value for a key overwrites an earlier one's. A segment
/// that ends inside a record contributes every complete record before the
/// cut; a warning is logged and replay moves on to the next segment.
///
/// Returns the memtable and the paths of the segments replayed.
///
/// # Errors
///
/// An unreadable segment or a record with an impossible length prefix.
pub fn replay_all(dir: &Path) -> Result<(Memtable, Vec<PathBuf>)> {
    let segments = wal::list_segments(dir)
        .with_context(|| format!("failed to list wal segments in {}", dir.display()))?;

    let mut mem = Memtable::new();
    for segment in &segments {
        if let Some(id) = wal::parse_segment_id(segment) {
            advance_past(id);
        }
        let outcome = WalReader::open(segment)
            .and_then(|mut reader| reader.replay(|key, value| mem.put(key, value)))
            .with_context(|| format!("failed to replay {}", segment.display()))?;

        if outcome.truncated {
            warn!(
                segment = %segment.display(),
                records = outcome.records,
                valid_bytes = outcome.valid_bytes,
                "wal segment ends in a truncated record, partial tail dropped"
            );
        } else {
            debug!(segment = %segment.display(), records = outcome.records, "replayed wal segment");
        }
    }
    Ok((mem, segments))
}

/// Deletes temp files, SSTables the manifest does not list, and snapshots
/// other than the one `CURRENT` names.
///
/// Unlisted tables come from a flush or compaction that died before its
/// snapshot was installed; their data is still in a WAL segment or in the
/// listed tables. Failures are logged and skipped.
pub(crate) fn remove_stale_files(dir: &Path, manifest: &Manifest) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot scan data directory for stale files");
            return;
        }
    };

    let referenced = manifest.referenced_files();
    let current = manifest.snapshot_name();

    for entry in entries.flatten() {
        let path = entry.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };

        let stale = if name.ends_with(sstable::TMP_SUFFIX) || name == CURRENT_TMP_FILE {
            true
        } else if sstable::is_table_file(&path) {
            if let Some(id) = sstable::parse_table_id(&path) {
                advance_past(id);
            }
            !referenced.contains(&name)
        } else if name.starts_with(MANIFEST_PREFIX) {
            Some(name.as_str()) != current
        } else {
            false
        };

        if stale {
            match fs::remove_file(&path) {
                Ok(()) => info!(file = %name, "removed stale file"),
                Err(e) => warn!(file = %name, error = %e, "failed to remove stale file"),
            }
        }
    }
}
