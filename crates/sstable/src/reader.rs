//! Read path: reopening a table and point lookups.

use bloom::BloomFilter;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::ops::Bound;
use std::path::{Path, PathBuf};

use crate::format::{read_field_len, BlockCursor, RECORD_OVERHEAD};
use crate::meta::{BlockHandle, LayoutTracker, TableMeta};
use crate::{Result, SSTableError};

/// An open, immutable table.
///
/// Holds the sparse block index, the Bloom filter and the key range in
/// memory, plus one file handle shared by lookups through a `Mutex`, so
/// `get` only needs `&self` and a table can sit behind an `Arc`.
pub struct SSTable {
    path: PathBuf,
    /// First key of each block -> where the block lives.
    index: BTreeMap<Vec<u8>, BlockHandle>,
    bloom: BloomFilter,
    min_key: Vec<u8>,
    max_key: Vec<u8>,
    entries: usize,
    data_len: u64,
    file: Mutex<File>,
}

impl SSTable {
    pub(crate) fn from_parts(path: PathBuf, meta: TableMeta, file: File) -> Self {
        Self {
            path,
            index: meta.index,
            bloom: meta.bloom,
            min_key: meta.min_key,
            max_key: meta.max_key,
            entries: meta.entries,
            data_len: meta.data_len,
            file: Mutex::new(file),
        }
    }

    /// Opens an existing table and rebuilds its index, filter and key range
    /// with one sequential pass over the file.
    ///
    /// # Errors
    ///
    /// [`SSTableError::Corrupt`] if the file is empty, ends inside a record,
    /// or its keys are not strictly ascending; I/O errors otherwise.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_len = file.metadata()?.len();

        let mut rdr = BufReader::new(file);
        let mut layout = LayoutTracker::new();
        let mut offset = 0u64;

        while offset < file_len {
            let (key, val_len) = scan_record_header(&mut rdr)
                .map_err(|e| rescan_error(&path, offset, e))?;
            if layout.last_key().is_some_and(|last| last >= key.as_slice()) {
                return Err(SSTableError::corrupt(&path, offset, "keys out of order"));
            }
            rdr.seek_relative(i64::from(val_len))?;

            let record_len = RECORD_OVERHEAD + key.len() as u64 + u64::from(val_len);
            if offset + record_len > file_len {
                return Err(SSTableError::corrupt(&path, offset, "record extends past end of file"));
            }
            layout.add(&key, offset, record_len);
            offset += record_len;
        }

        let meta = layout
            .finish()
            .ok_or_else(|| SSTableError::corrupt(&path, 0, "table holds no records"))?;
        let file = rdr.into_inner();
        Ok(Self::from_parts(path, meta, file))
    }

    /// Point lookup. Returns the stored value (possibly a tombstone) or
    /// `None` if this table does not hold `key`.
    ///
    /// # Errors
    ///
    /// I/O failures while reading the block and malformed blocks are errors,
    /// never `None`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if key < self.min_key.as_slice() || key > self.max_key.as_slice() {
            return Ok(None);
        }
        if !self.bloom.may_contain(key) {
            return Ok(None);
        }

        let handle = match self
            .index
            .range::<[u8], _>((Bound::Unbounded, Bound::Included(key)))
            .next_back()
        {
            Some((_, handle)) => *handle,
            None => return Ok(None),
        };

        let block = self.read_block(handle)?;
        let mut cursor = BlockCursor::new(&block);
        loop {
            let at = handle.offset + cursor.position() as u64;
            match cursor.next_record() {
                Ok(Some((k, v))) => {
                    if k == key {
                        return Ok(Some(v.to_vec()));
                    }
                    if k > key {
                        return Ok(None);
                    }
                }
                Ok(None) => return Ok(None),
                Err(reason) => return Err(SSTableError::corrupt(&self.path, at, reason)),
            }
        }
    }

    fn read_block(&self, handle: BlockHandle) -> Result<Vec<u8>> {
        let len = usize::try_from(handle.len)
            .map_err(|_| SSTableError::corrupt(&self.path, handle.offset, "block length overflow"))?;
        let mut block = vec![0u8; len];

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(handle.offset))?;
        match file.read_exact(&mut block) {
            Ok(()) => Ok(block),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(SSTableError::corrupt(
                &self.path,
                handle.offset,
                "block extends past end of file",
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// `false` means `key` is definitely not in this table.
    #[must_use]
    pub fn may_contain(&self, key: &[u8]) -> bool {
        self.bloom.may_contain(key)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file name relative to its directory, as recorded in manifests.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn min_key(&self) -> &[u8] {
        &self.min_key
    }

    #[must_use]
    pub fn max_key(&self) -> &[u8] {
        &self.max_key
    }

    /// Number of records in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
    }

    /// `true` only for a table with no records, which the writer never produces.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    #[must_use]
    pub fn block_count(&self) -> usize {
        self.index.len()
    }

    /// Block handles in ascending first-key order.
    pub fn blocks(&self) -> impl Iterator<Item = (&[u8], BlockHandle)> {
        self.index.iter().map(|(k, h)| (k.as_slice(), *h))
    }

    /// Total bytes of record data.
    #[must_use]
    pub fn data_len(&self) -> u64 {
        self.data_len
    }
}

impl AsRef<SSTable> for SSTable {
    fn as_ref(&self) -> &SSTable {
        self
    }
}

impl PartialEq for SSTable {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for SSTable {}

impl std::fmt::Debug for SSTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SSTable")
            .field("path", &self.path)
            .field("entries", &self.entries)
            .field("blocks", &self.index.len())
            .field("min_key", &String::from_utf8_lossy(&self.min_key))
            .field("max_key", &String::from_utf8_lossy(&self.max_key))
            .finish()
    }
}

/// Reads a record's key and value length, leaving the reader at the value.
fn scan_record_header<R: Read>(r: &mut R) -> io::Result<(Vec<u8>, u32)> {
    let key_len = read_field_len(r)?;
    let mut key = vec![0u8; key_len as usize];
    r.read_exact(&mut key)?;
    let val_len = read_field_len(r)?;
    Ok((key, val_len))
}

fn rescan_error(path: &Path, offset: u64, e: io::Error) -> SSTableError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof => SSTableError::corrupt(path, offset, "truncated record"),
        io::ErrorKind::InvalidData => SSTableError::corrupt(path, offset, e.to_string()),
        _ => SSTableError::Io(e),
    }
}
