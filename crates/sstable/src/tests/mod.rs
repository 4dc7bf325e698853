use anyhow::Result;
use memtable::Memtable;
use std::path::{Path, PathBuf};

use crate::{table_path, SSTable};

mod merge_tests;

/// Builds a memtable from `(key, value)` pairs.
fn memtable_of(entries: &[(&[u8], &[u8])]) -> Memtable {
    let mut m = Memtable::new();
    for &(k, v) in entries {
        m.put(k.to_vec(), v.to_vec());
    }
    m
}

/// Writes `entries` to `sstable-<id>.sst` under `dir`.
fn write_table(dir: &Path, id: u64, entries: &[(&[u8], &[u8])]) -> Result<SSTable> {
    let path = table_path(dir, id);
    Ok(SSTable::from_memtable(&memtable_of(entries), &path)?)
}

/// `count` keys `key-00`, `key-01`, ... each with a `value_len`-byte value.
fn numbered(count: usize, value_len: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..count)
        .map(|i| (format!("key-{i:02}").into_bytes(), vec![b'v'; value_len]))
        .collect()
}

fn tmp_files(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.to_string_lossy().ends_with(crate::TMP_SUFFIX))
        .collect()
}
