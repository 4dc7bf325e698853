//! Write path: turns an ascending entry stream into a table file.

use memtable::Memtable;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::format::{write_record, TMP_SUFFIX};
use crate::meta::{LayoutTracker, TableMeta};
use crate::{EntrySource, Result, SSTable, SSTableError};

impl SSTable {
    /// Writes the entries of `mem` to a new table at `path`.
    ///
    /// # Errors
    ///
    /// [`SSTableError::Empty`] for an empty memtable, otherwise any I/O failure.
    pub fn from_memtable(mem: &Memtable, path: &Path) -> Result<SSTable> {
        Self::build(mem.iter(), path)
    }

    /// Streams `source` into a new table at `path` and returns it opened.
    ///
    /// # Crash Safety
    ///
    /// Data goes to `<path>.sst.tmp`, is fsynced, and only then renamed to
    /// `path`; the parent directory is fsynced after the rename. A crash
    /// leaves at worst a temp file, which startup removes.
    ///
    /// # Errors
    ///
    /// - [`SSTableError::Empty`] if `source` yields nothing.
    /// - [`SSTableError::OutOfOrder`] if keys are not strictly ascending.
    /// - Any error produced by `source` itself, or an I/O failure.
    ///
    /// On error the temp file is removed and `path` is never created.
    pub fn build<S: EntrySource>(mut source: S, path: &Path) -> Result<SSTable> {
        let tmp_path = tmp_path_for(path);

        let meta = match write_data(&mut source, path, &tmp_path) {
            Ok(meta) => meta,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                return Err(e);
            }
        };

        fs::rename(&tmp_path, path)?;
        if let Some(parent) = path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        debug!(
            table = %path.display(),
            entries = meta.entries,
            blocks = meta.index.len(),
            bytes = meta.data_len,
            "wrote sstable"
        );

        let file = File::open(path)?;
        Ok(SSTable::from_parts(path.to_path_buf(), meta, file))
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_stem().map(|s| s.to_os_string()).unwrap_or_default();
    name.push(TMP_SUFFIX);
    path.with_file_name(name)
}

fn write_data<S: EntrySource>(source: &mut S, path: &Path, tmp_path: &Path) -> Result<TableMeta> {
    let raw = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(tmp_path)?;
    let mut file = BufWriter::new(raw);
    let mut layout = LayoutTracker::new();
    let mut offset = 0u64;

    while let Some((key, value)) = source.next_entry()? {
        if layout.last_key().is_some_and(|last| last >= key.as_slice()) {
            return Err(SSTableError::OutOfOrder {
                path: path.to_path_buf(),
            });
        }
        let written = write_record(&mut file, &key, &value)?;
        layout.add(&key, offset, written);
        offset += written;
    }

    let meta = layout.finish().ok_or(SSTableError::Empty)?;

    file.flush()?;
    file.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(meta)
}
