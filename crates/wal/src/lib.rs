//! # WAL — Write-Ahead Log
//!
//! Durability for the memtable generation that is currently accepting writes.
//!
//! Each memtable generation owns exactly one *segment* file named
//! `wal-<id>.log`, where `id` is a zero-padded, strictly increasing
//! timestamp. A put is acknowledged only after its record has been written
//! and flushed to the segment. Once the generation is durably reflected in
//! an SSTable the segment is deleted.
//!
//! On startup every surviving segment is replayed in id order, so a later
//! segment's value for a key overwrites an earlier one.
//!
//! ## Record Format
//!
//! ```text
//! [key_len: u32 BE][key bytes][value_len: u32 BE][value bytes]
//! ```
//!
//! There is no framing beyond the two length prefixes. SSTable data files use
//! the very same record encoding.
//!
//! ## Example
//!
//! ```rust,no_run
//! use wal::{WalReader, WalWriter};
//!
//! let mut w = WalWriter::create("wal-00000000000000000001.log", true).unwrap();
//! w.append(b"hello", b"world").unwrap();
//! w.close().unwrap();
//!
//! let mut r = WalReader::open("wal-00000000000000000001.log").unwrap();
//! r.replay(|k, v| println!("{:?} => {:?}", k, v)).unwrap();
//! ```

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// File name prefix of a WAL segment.
pub const SEGMENT_PREFIX: &str = "wal-";
/// File name suffix of a WAL segment.
pub const SEGMENT_SUFFIX: &str = ".log";

/// Largest key or value a record may carry (64 MiB). A length prefix above
/// this can only come from a damaged file.
pub const MAX_FIELD_BYTES: u32 = 64 * 1024 * 1024;

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A record that cannot be a truncated tail, e.g. an absurd length prefix.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Returns the file name of the segment with the given id.
pub fn segment_file_name(id: u64) -> String {
    format!("{SEGMENT_PREFIX}{id:020}{SEGMENT_SUFFIX}")
}

/// Returns `dir/wal-<id>.log`.
pub fn segment_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(segment_file_name(id))
}

/// Extracts the creation id embedded in a segment file name.
pub fn parse_segment_id(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    name.strip_prefix(SEGMENT_PREFIX)?
        .strip_suffix(SEGMENT_SUFFIX)?
        .parse()
        .ok()
}

/// Returns `true` if `path` follows the segment naming convention.
pub fn is_segment(path: &Path) -> bool {
    parse_segment_id(path).is_some()
}

/// Lists all segments in `dir`, oldest first.
///
/// A missing directory holds no segments.
pub fn list_segments(dir: &Path) -> Result<Vec<PathBuf>, WalError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut segments: Vec<(u64, PathBuf)> = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if let Some(id) = parse_segment_id(&path) {
            segments.push((id, path));
        }
    }
    segments.sort_by_key(|(id, _)| *id);
    Ok(segments.into_iter().map(|(_, p)| p).collect())
}

/// Appends one record to `buf` in the shared record encoding.
///
/// # Errors
///
/// Returns `InvalidInput` if either field does not fit the `u32` prefix.
pub fn encode_record(buf: &mut Vec<u8>, key: &[u8], value: &[u8]) -> io::Result<()> {
    for field in [key, value] {
        let len = u32::try_from(field.len())
            .ok()
            .filter(|len| *len <= MAX_FIELD_BYTES)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("record field too large: {} bytes", field.len()),
                )
            })?;
        buf.write_u32::<BigEndian>(len)?;
        buf.extend_from_slice(field);
    }
    Ok(())
}

/// Append-only writer for a single segment.
///
/// Records are encoded into a reusable buffer and handed to the file in one
/// `write_all`. With `sync` enabled every append also calls `sync_data`, so a
/// returned `Ok` means the record survives a power loss.
pub struct WalWriter {
    path: PathBuf,
    file: File,
    sync: bool,
    buf: Vec<u8>,
}

impl WalWriter {
    /// Opens (or creates) the segment at `path` in append mode.
    pub fn create<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file,
            sync,
            buf: Vec::with_capacity(256),
        })
    }

    /// Path of the segment this writer appends to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes one record and flushes it before returning.
    pub fn append(&mut self, key: &[u8], value: &[u8]) -> Result<(), WalError> {
        self.buf.clear();
        encode_record(&mut self.buf, key, value)?;

        self.file.write_all(&self.buf)?;
        self.file.flush()?;
        if self.sync {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Forces everything written so far to stable storage.
    pub fn sync_to_disk(&mut self) -> Result<(), WalError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Syncs and releases the file handle.
    pub fn close(mut self) -> Result<(), WalError> {
        self.sync_to_disk()
    }

    /// Releases the file handle and removes the segment.
    ///
    /// Only call this once every record in the segment is durably stored
    /// elsewhere. Removing an already missing segment is not an error.
    pub fn delete(self) -> Result<(), WalError> {
        let WalWriter { path, file, .. } = self;
        drop(file);
        remove_segment(&path)
    }
}

impl std::fmt::Debug for WalWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalWriter")
            .field("path", &self.path)
            .field("sync", &self.sync)
            .finish()
    }
}

/// Removes the segment at `path`, ignoring a segment that is already gone.
pub fn remove_segment(path: &Path) -> Result<(), WalError> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(segment = %path.display(), "removed wal segment");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Summary of one [`WalReader::replay`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayOutcome {
    /// Complete records handed to the callback.
    pub records: usize,
    /// Bytes covered by those complete records.
    pub valid_bytes: u64,
    /// `true` if the segment ended in the middle of a record.
    pub truncated: bool,
}

/// Sequential reader over one segment.
///
/// Generic over any `Read` so tests can replay in-memory buffers.
#[derive(Debug)]
pub struct WalReader<R: Read> {
    rdr: BufReader<R>,
}

impl WalReader<File> {
    /// Opens an existing segment for replay.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<WalReader<File>, WalError> {
        let f = File::open(path)?;
        Ok(WalReader {
            rdr: BufReader::new(f),
        })
    }
}

impl<R: Read> WalReader<R> {
    pub fn from_reader(reader: R) -> Self {
        WalReader {
            rdr: BufReader::new(reader),
        }
    }

    /// Calls `apply(key, value)` for every complete record, in file order.
    ///
    /// # Termination
    ///
    /// - **Clean EOF** on a record boundary: `Ok` with `truncated == false`.
    /// - **Truncated tail** (EOF inside a length prefix or payload, e.g. a
    ///   crash mid-append): `Ok` with `truncated == true`; the partial record
    ///   is not applied.
    /// - **Length prefix above [`MAX_FIELD_BYTES`]**: `Err(WalError::Corrupt)`.
    /// - **I/O error**: `Err(WalError::Io)`.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<ReplayOutcome, WalError>
    where
        F: FnMut(Vec<u8>, Vec<u8>),
    {
        let mut outcome = ReplayOutcome::default();

        loop {
            let key = match self.read_field(true)? {
                Field::Complete(bytes) => bytes,
                Field::CleanEnd => return Ok(outcome),
                Field::Truncated => {
                    outcome.truncated = true;
                    return Ok(outcome);
                }
            };
            let value = match self.read_field(false)? {
                Field::Complete(bytes) => bytes,
                Field::CleanEnd | Field::Truncated => {
                    outcome.truncated = true;
                    return Ok(outcome);
                }
            };

            outcome.records += 1;
            outcome.valid_bytes += (key.len() + value.len() + 8) as u64;
            apply(key, value);
        }
    }

    /// Reads one `[len][bytes]` field. A clean end is only possible at the
    /// very start of a record (`at_record_start`).
    fn read_field(&mut self, at_record_start: bool) -> Result<Field, WalError> {
        let mut len_buf = [0u8; 4];
        let got = read_up_to(&mut self.rdr, &mut len_buf)?;
        if got == 0 && at_record_start {
            return Ok(Field::CleanEnd);
        }
        if got < len_buf.len() {
            return Ok(Field::Truncated);
        }

        let len = BigEndian::read_u32(&len_buf);
        if len > MAX_FIELD_BYTES {
            return Err(WalError::Corrupt(format!(
                "length prefix {} exceeds maximum {}",
                len, MAX_FIELD_BYTES
            )));
        }

        let mut bytes = vec![0u8; len as usize];
        match self.rdr.read_exact(&mut bytes) {
            Ok(()) => Ok(Field::Complete(bytes)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(Field::Truncated),
            Err(e) => Err(e.into()),
        }
    }
}

enum Field {
    Complete(Vec<u8>),
    CleanEnd,
    Truncated,
}

/// Like `read_exact`, but reports how many bytes arrived before EOF instead
/// of failing.
fn read_up_to<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
