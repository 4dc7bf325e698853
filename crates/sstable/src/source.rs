//! Sorted entry streams that feed the table writer.

use memtable::Iter as MemtableIter;

use crate::Result;

/// A finite stream of `(key, value)` pairs in strictly ascending key order.
///
/// This is what [`SSTable::build`](crate::SSTable::build) consumes, so a
/// memtable flush and a compaction merge share one writer.
pub trait EntrySource {
    /// Next entry, or `Ok(None)` once the stream is done.
    fn next_entry(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>>;
}

impl EntrySource for MemtableIter<'_> {
    fn next_entry(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        Ok(self.next().map(|(k, v)| (k.to_vec(), v.to_vec())))
    }
}

impl EntrySource for std::vec::IntoIter<(Vec<u8>, Vec<u8>)> {
    fn next_entry(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        Ok(self.next())
    }
}

impl<S: EntrySource + ?Sized> EntrySource for &mut S {
    fn next_entry(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        (**self).next_entry()
    }
}
