//! File ids shared by WAL segments, SSTables and manifest snapshots.
//!
//! An id is a nanosecond timestamp, bumped when needed so that ids handed out
//! in this process are strictly increasing. Zero-padded to 20 digits in file
//! names, so lexical order is creation order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static LAST_ID: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_file_id() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0);

    let mut last = LAST_ID.load(Ordering::Relaxed);
    loop {
        let next = now.max(last.saturating_add(1));
        match LAST_ID.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// Makes every later id larger than `id`, e.g. one found on disk.
pub(crate) fn advance_past(id: u64) {
    LAST_ID.fetch_max(id, Ordering::Relaxed);
}
