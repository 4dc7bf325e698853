//! # SSTable - Sorted String Table
//!
//! Immutable, block-structured on-disk tables for the storage engine.
//!
//! A table is written once, either from a memtable that was rotated out or
//! from the merged output of a compaction, and is never modified afterwards.
//!
//! ## File layout
//!
//! ```text
//! ┌─────────────────────────────────────────────┐ offset 0
//! │ key_len (u32 BE) | key | val_len (u32 BE) | val │  block 0
//! │ ...                                          │
//! ├─────────────────────────────────────────────┤ first record whose
//! │ ...                                          │ addition would push
//! │                                              │ block 0 past 4000 B
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Records are stored in strictly ascending key order and nothing else is
//! stored: there is no footer, no persisted index and no persisted filter.
//! Block boundaries are a pure function of the record sizes in order, so the
//! sparse block index, the Bloom filter and the key range are rebuilt on
//! [`SSTable::open`] by one sequential rescan that reproduces exactly what
//! the writer computed.
//!
//! ## Point lookups
//!
//! 1. Reject keys outside `[min_key, max_key]`.
//! 2. Reject keys the Bloom filter has never seen (no disk read).
//! 3. Pick the block whose first key is the largest one `<=` the target.
//! 4. Read that block and scan it, stopping as soon as a larger key shows up.
//!
//! Values are opaque: a tombstone is returned like any other value.

mod error;
mod format;
mod iter;
mod merge;
mod meta;
mod reader;
mod source;
mod writer;

pub use error::{Result, SSTableError};
pub use format::{
    is_table_file, parse_table_id, table_file_name, table_path, BLOOM_EXPECTED_INSERTIONS,
    BLOOM_FALSE_POSITIVE_RATE, MAX_BLOCK_SIZE, TABLE_PREFIX, TABLE_SUFFIX, TMP_SUFFIX,
};
pub use iter::SSTableIterator;
pub use merge::{Compactor, MergeIterator, TombstonePolicy};
pub use meta::BlockHandle;
pub use reader::SSTable;
pub use source::EntrySource;

#[cfg(test)]
mod tests;
