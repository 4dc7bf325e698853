//! In-memory table metadata shared by the write path and the reopen rescan.
//!
//! Both paths feed every record, in file order, through one
//! [`LayoutTracker`]. Because the tracker is the only place that decides
//! block boundaries, a reopened table always gets the exact index the writer
//! produced.

use bloom::BloomFilter;
use std::collections::BTreeMap;

use crate::format::{BLOOM_EXPECTED_INSERTIONS, BLOOM_FALSE_POSITIVE_RATE, MAX_BLOCK_SIZE};

/// Location of one block inside a table file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHandle {
    pub offset: u64,
    pub len: u64,
}

pub(crate) struct TableMeta {
    pub(crate) index: BTreeMap<Vec<u8>, BlockHandle>,
    pub(crate) bloom: BloomFilter,
    pub(crate) min_key: Vec<u8>,
    pub(crate) max_key: Vec<u8>,
    pub(crate) entries: usize,
    pub(crate) data_len: u64,
}

pub(crate) struct LayoutTracker {
    index: BTreeMap<Vec<u8>, BlockHandle>,
    bloom: BloomFilter,
    min_key: Option<Vec<u8>>,
    max_key: Option<Vec<u8>>,
    entries: usize,
    block_start: u64,
    block_len: u64,
    block_first_key: Option<Vec<u8>>,
}

impl LayoutTracker {
    pub(crate) fn new() -> Self {
        Self {
            index: BTreeMap::new(),
            bloom: BloomFilter::new(BLOOM_EXPECTED_INSERTIONS, BLOOM_FALSE_POSITIVE_RATE),
            min_key: None,
            max_key: None,
            entries: 0,
            block_start: 0,
            block_len: 0,
            block_first_key: None,
        }
    }

    /// Last key recorded so far.
    pub(crate) fn last_key(&self) -> Option<&[u8]> {
        self.max_key.as_deref()
    }

    /// Records a `record_len`-byte entry for `key` starting at `offset`.
    ///
    /// Closes the current block first if the entry would push it past
    /// [`MAX_BLOCK_SIZE`]; a block always receives at least one entry.
    pub(crate) fn add(&mut self, key: &[u8], offset: u64, record_len: u64) {
        if self.block_len + record_len > MAX_BLOCK_SIZE {
            if let Some(first) = self.block_first_key.take() {
                self.index.insert(
                    first,
                    BlockHandle {
                        offset: self.block_start,
                        len: self.block_len,
                    },
                );
                self.block_start = offset;
                self.block_len = 0;
            }
        }

        if self.block_first_key.is_none() {
            self.block_first_key = Some(key.to_vec());
        }
        self.block_len += record_len;

        self.bloom.insert(key);
        if self.min_key.is_none() {
            self.min_key = Some(key.to_vec());
        }
        self.max_key = Some(key.to_vec());
        self.entries += 1;
    }

    /// Seals the last block. `None` if no entry was ever added.
    pub(crate) fn finish(mut self) -> Option<TableMeta> {
        let first = self.block_first_key.take()?;
        self.index.insert(
            first,
            BlockHandle {
                offset: self.block_start,
                len: self.block_len,
            },
        );
        let data_len = self.block_start + self.block_len;

        Some(TableMeta {
            index: self.index,
            bloom: self.bloom,
            min_key: self.min_key?,
            max_key: self.max_key?,
            entries: self.entries,
            data_len,
        })
    }
}
