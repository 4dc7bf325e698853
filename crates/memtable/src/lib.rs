//! # Memtable
//!
//! Sorted in-memory write buffer for one generation of writes.
//!
//! The memtable stores raw values. A deletion is just a put of
//! [`TOMBSTONE`]; interpreting that marker is left to the engine's read
//! path, so every layer below it can treat values as opaque bytes.
//!
//! The running size estimate mirrors the on-disk cost of the entries: each
//! key and value is charged its byte length plus the 4-byte length prefix
//! it will carry in the WAL and SSTable record format.

use std::collections::btree_map;
use std::collections::BTreeMap;

/// Reserved value marking a logical deletion.
///
/// The engine refuses to store this byte string as a real value, so seeing
/// it in any layer always means "deleted".
pub const TOMBSTONE: &[u8] = b"<TOMBSTONE>";

/// Bytes of length prefix charged per key and per value.
pub const LENGTH_PREFIX_BYTES: usize = 4;

/// Returns `true` if `value` is the deletion marker.
#[inline]
#[must_use]
pub fn is_tombstone(value: &[u8]) -> bool {
    value == TOMBSTONE
}

/// Estimated serialized size of one key or value.
#[inline]
#[must_use]
pub fn estimated_size(bytes: &[u8]) -> usize {
    bytes.len() + LENGTH_PREFIX_BYTES
}

#[derive(Debug, Default, Clone)]
pub struct Memtable {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
    size_bytes: usize,
}

impl Memtable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites `key`.
    ///
    /// A new key is charged for itself and its value; an overwrite swaps the
    /// old value's charge for the new one.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        let value_size = estimated_size(&value);
        match self.map.entry(key) {
            btree_map::Entry::Occupied(mut slot) => {
                let old_size = estimated_size(slot.get());
                slot.insert(value);
                self.size_bytes = self.size_bytes - old_size + value_size;
            }
            btree_map::Entry::Vacant(slot) => {
                self.size_bytes += estimated_size(slot.key()) + value_size;
                slot.insert(value);
            }
        }
    }

    /// Returns the stored value, which may be [`TOMBSTONE`].
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.map.get(key).map(Vec::as_slice)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.map.contains_key(key)
    }

    /// Estimated serialized size in bytes.
    pub fn size(&self) -> usize {
        self.size_bytes
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drops every entry and resets the size estimate.
    pub fn clear(&mut self) {
        self.map.clear();
        self.size_bytes = 0;
    }

    /// Entries in ascending key order. Each call starts from the smallest key.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self.map.iter(),
        }
    }
}

/// Ascending `(key, value)` iterator over a [`Memtable`].
pub struct Iter<'a> {
    inner: btree_map::Iter<'a, Vec<u8>, Vec<u8>>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a Memtable {
    type Item = (&'a [u8], &'a [u8]);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
