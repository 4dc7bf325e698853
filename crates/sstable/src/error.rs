use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SSTableError>;

/// Errors surfaced by SSTable reads, writes and iteration.
#[derive(Debug, Error)]
pub enum SSTableError {
    /// Disk read, write or sync failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The file does not parse as a sequence of ordered records.
    #[error("corrupt sstable {}: {reason} (offset {offset})", .path.display())]
    Corrupt {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    /// `next_record` was called on an iterator with nothing left.
    #[error("iterator over {} is exhausted", .path.display())]
    Exhausted { path: PathBuf },

    /// The entry source produced keys that were not strictly ascending.
    #[error("entries for {} are not in strictly ascending key order", .path.display())]
    OutOfOrder { path: PathBuf },

    /// The entry source produced nothing to write.
    #[error("refusing to write an empty SSTable")]
    Empty,
}

impl SSTableError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, offset: u64, reason: impl Into<String>) -> Self {
        SSTableError::Corrupt {
            path: path.into(),
            offset,
            reason: reason.into(),
        }
    }

    /// `true` for errors that mean the file contents are damaged.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, SSTableError::Corrupt { .. })
    }
}
