//! K-way merge of tables and the compactor built on it.
//!
//! Inputs are ordered oldest to newest. When a key appears in more than one
//! input, the value from the newest input wins and the others are dropped.

use memtable::is_tombstone;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::Path;
use tracing::{debug, info};

use crate::{EntrySource, Result, SSTable, SSTableError, SSTableIterator};

/// The current head record of one input.
struct HeapEntry {
    key: Vec<u8>,
    value: Vec<u8>,
    /// Input position; larger means newer.
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: smallest key on top, newest source first among equals.
        other
            .key
            .cmp(&self.key)
            .then_with(|| self.source.cmp(&other.source))
    }
}

/// Streams the union of several tables in ascending key order, one record
/// per key, newest input winning.
pub struct MergeIterator {
    sources: Vec<SSTableIterator>,
    heap: BinaryHeap<HeapEntry>,
}

impl MergeIterator {
    /// `sources` must be ordered oldest to newest.
    pub fn new(sources: Vec<SSTableIterator>) -> Result<Self> {
        let mut merge = Self {
            heap: BinaryHeap::with_capacity(sources.len()),
            sources,
        };
        for source in 0..merge.sources.len() {
            merge.refill(source)?;
        }
        Ok(merge)
    }

    fn refill(&mut self, source: usize) -> Result<()> {
        let it = &mut self.sources[source];
        if it.has_next() {
            let (key, value) = it.next_record()?;
            self.heap.push(HeapEntry { key, value, source });
        }
        Ok(())
    }

    /// Next merged record, or `None` when every input is drained.
    pub fn next_merged(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let top = match self.heap.pop() {
            Some(top) => top,
            None => return Ok(None),
        };
        self.refill(top.source)?;

        // Older copies of the same key.
        while self.heap.peek().is_some_and(|e| e.key == top.key) {
            if let Some(stale) = self.heap.pop() {
                self.refill(stale.source)?;
            }
        }

        Ok(Some((top.key, top.value)))
    }
}

impl EntrySource for MergeIterator {
    fn next_entry(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        self.next_merged()
    }
}

/// What a compaction does with tombstones that win the merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TombstonePolicy {
    /// Omit them from the output. Only safe when no older table outside the
    /// compaction could still hold the key.
    Drop,
    /// Copy them to the output so they keep shadowing older tables.
    Retain,
}

/// Merges a set of tables into a single new one.
#[derive(Debug, Clone, Copy)]
pub struct Compactor {
    tombstones: TombstonePolicy,
}

impl Compactor {
    pub fn new(tombstones: TombstonePolicy) -> Self {
        Self { tombstones }
    }

    pub fn tombstone_policy(&self) -> TombstonePolicy {
        self.tombstones
    }

    /// Merges `inputs` (oldest to newest) into a new table at `output`.
    ///
    /// Returns `Ok(None)` when nothing survives the merge, in which case no
    /// file is created. Inputs are left untouched; deleting them is up to
    /// the caller once the result is recorded.
    pub fn compact<T: AsRef<SSTable>>(&self, inputs: &[T], output: &Path) -> Result<Option<SSTable>> {
        let sources = inputs
            .iter()
            .map(|t| SSTableIterator::open(t.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let merge = MergeIterator::new(sources)?;

        let mut dropped = 0usize;
        let policy = self.tombstones;
        let mut filtered = Filtered {
            inner: merge,
            policy,
            dropped: &mut dropped,
        };

        let table = match SSTable::build(&mut filtered, output) {
            Ok(table) => Some(table),
            Err(SSTableError::Empty) => None,
            Err(e) => return Err(e),
        };

        match &table {
            Some(t) => info!(
                inputs = inputs.len(),
                output = %output.display(),
                entries = t.len(),
                tombstones_dropped = dropped,
                "compaction merged tables"
            ),
            None => debug!(
                inputs = inputs.len(),
                tombstones_dropped = dropped,
                "compaction produced no live entries"
            ),
        }
        Ok(table)
    }
}

struct Filtered<'a> {
    inner: MergeIterator,
    policy: TombstonePolicy,
    dropped: &'a mut usize,
}

impl EntrySource for Filtered<'_> {
    fn next_entry(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        while let Some((key, value)) = self.inner.next_merged()? {
            if self.policy == TombstonePolicy::Drop && is_tombstone(&value) {
                *self.dropped += 1;
                continue;
            }
            return Ok(Some((key, value)));
        }
        Ok(None)
    }
}
