//! Record encoding and table file naming.

use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Upper bound on the serialized entries of one block.
///
/// A single record larger than this still gets a block of its own.
pub const MAX_BLOCK_SIZE: u64 = 4000;

/// Keys each table's Bloom filter is sized for.
pub const BLOOM_EXPECTED_INSERTIONS: usize = 10_000;

/// Target false positive rate at [`BLOOM_EXPECTED_INSERTIONS`] keys.
pub const BLOOM_FALSE_POSITIVE_RATE: f64 = 0.01;

pub const TABLE_PREFIX: &str = "sstable-";
pub const TABLE_SUFFIX: &str = ".sst";
/// Suffix of a table still being written; never referenced by a manifest.
pub const TMP_SUFFIX: &str = ".sst.tmp";

/// Length prefixes per record: one for the key, one for the value.
pub(crate) const RECORD_OVERHEAD: u64 = 8;

/// Largest key or value we will allocate for while reading (64 MiB).
pub(crate) const MAX_FIELD_BYTES: u32 = 64 * 1024 * 1024;

pub fn table_file_name(id: u64) -> String {
    format!("{TABLE_PREFIX}{id:020}{TABLE_SUFFIX}")
}

pub fn table_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(table_file_name(id))
}

pub fn parse_table_id(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    name.strip_prefix(TABLE_PREFIX)?
        .strip_suffix(TABLE_SUFFIX)?
        .parse()
        .ok()
}

/// `true` for completed table files (`sstable-<id>.sst`).
pub fn is_table_file(path: &Path) -> bool {
    parse_table_id(path).is_some()
}

pub(crate) fn record_len(key: &[u8], value: &[u8]) -> u64 {
    RECORD_OVERHEAD + key.len() as u64 + value.len() as u64
}

/// Writes `[key_len][key][val_len][val]` and returns the bytes written.
pub(crate) fn write_record<W: Write>(w: &mut W, key: &[u8], value: &[u8]) -> io::Result<u64> {
    for field in [key, value] {
        let len = u32::try_from(field.len()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("record field too large: {} bytes", field.len()),
            )
        })?;
        w.write_u32::<BigEndian>(len)?;
        w.write_all(field)?;
    }
    Ok(record_len(key, value))
}

/// Reads one length prefix, rejecting sizes no writer could have produced.
pub(crate) fn read_field_len<R: Read>(r: &mut R) -> io::Result<u32> {
    let len = r.read_u32::<BigEndian>()?;
    if len > MAX_FIELD_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("length prefix {} exceeds maximum {}", len, MAX_FIELD_BYTES),
        ));
    }
    Ok(len)
}

/// Reads one full record.
pub(crate) fn read_record<R: Read>(r: &mut R) -> io::Result<(Vec<u8>, Vec<u8>)> {
    let key_len = read_field_len(r)?;
    let mut key = vec![0u8; key_len as usize];
    r.read_exact(&mut key)?;
    let val_len = read_field_len(r)?;
    let mut value = vec![0u8; val_len as usize];
    r.read_exact(&mut value)?;
    Ok((key, value))
}

/// Borrowing decoder over the records of one in-memory block.
pub(crate) struct BlockCursor<'a> {
    block: &'a [u8],
    pos: usize,
}

impl<'a> BlockCursor<'a> {
    pub(crate) fn new(block: &'a [u8]) -> Self {
        Self { block, pos: 0 }
    }

    /// Offset of the next record relative to the block start.
    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    /// Decodes the next record. `Ok(None)` at the exact end of the block;
    /// `Err` if a record runs past it.
    pub(crate) fn next_record(&mut self) -> std::result::Result<Option<(&'a [u8], &'a [u8])>, &'static str> {
        if self.pos == self.block.len() {
            return Ok(None);
        }
        let key = self.take_field()?;
        let value = self.take_field()?;
        Ok(Some((key, value)))
    }

    fn take_field(&mut self) -> std::result::Result<&'a [u8], &'static str> {
        let block: &'a [u8] = self.block;
        let rest = &block[self.pos..];
        if rest.len() < 4 {
            return Err("length prefix crosses block boundary");
        }
        let len = BigEndian::read_u32(&rest[..4]) as usize;
        let end = 4usize
            .checked_add(len)
            .filter(|end| *end <= rest.len())
            .ok_or("record crosses block boundary")?;
        self.pos += end;
        Ok(&rest[4..end])
    }
}
