//! Sequential cursor over every record of a table.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

use crate::format::{read_record, record_len};
use crate::{EntrySource, Result, SSTable, SSTableError};

/// Walks a table from its first record to its last.
///
/// Opens its own file handle, so it never contends with lookups on the
/// table it came from.
pub struct SSTableIterator {
    path: PathBuf,
    rdr: BufReader<File>,
    pos: u64,
    end: u64,
}

impl SSTableIterator {
    pub fn open(table: &SSTable) -> Result<Self> {
        let file = File::open(table.path())?;
        Ok(Self {
            path: table.path().to_path_buf(),
            rdr: BufReader::new(file),
            pos: 0,
            end: table.data_len(),
        })
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.pos < self.end
    }

    /// Returns the next record.
    ///
    /// # Errors
    ///
    /// [`SSTableError::Exhausted`] once [`has_next`](Self::has_next) is
    /// `false`; [`SSTableError::Corrupt`] if the file ends mid-record.
    pub fn next_record(&mut self) -> Result<(Vec<u8>, Vec<u8>)> {
        if !self.has_next() {
            return Err(SSTableError::Exhausted {
                path: self.path.clone(),
            });
        }
        let (key, value) = read_record(&mut self.rdr).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => {
                SSTableError::corrupt(&self.path, self.pos, e.to_string())
            }
            _ => SSTableError::Io(e),
        })?;
        self.pos += record_len(&key, &value);
        Ok((key, value))
    }

    /// Releases the file handle.
    pub fn close(self) {}
}

impl EntrySource for SSTableIterator {
    fn next_entry(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        if self.has_next() {
            self.next_record().map(Some)
        } else {
            Ok(None)
        }
    }
}
