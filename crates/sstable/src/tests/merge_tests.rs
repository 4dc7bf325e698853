use super::*;
use crate::{Compactor, MergeIterator, SSTableIterator, TombstonePolicy};
use memtable::TOMBSTONE;
use tempfile::tempdir;

fn merge_all(tables: &[SSTable]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let sources = tables
        .iter()
        .map(SSTableIterator::open)
        .collect::<crate::Result<Vec<_>>>()?;
    let mut merge = MergeIterator::new(sources)?;
    let mut out = Vec::new();
    while let Some(e) = merge.next_merged()? {
        out.push(e);
    }
    Ok(out)
}

#[test]
fn merge_disjoint_tables() -> Result<()> {
    let dir = tempdir()?;
    let t1 = write_table(dir.path(), 1, &[(b"a", b"1"), (b"c", b"3")])?;
    let t2 = write_table(dir.path(), 2, &[(b"b", b"2"), (b"d", b"4")])?;

    let keys: Vec<_> = merge_all(&[t1, t2])?.into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);
    Ok(())
}

#[test]
fn newest_input_wins_on_duplicates() -> Result<()> {
    let dir = tempdir()?;
    let oldest = write_table(dir.path(), 1, &[(b"k", b"v1"), (b"x", b"old")])?;
    let middle = write_table(dir.path(), 2, &[(b"k", b"v2")])?;
    let newest = write_table(dir.path(), 3, &[(b"k", b"v3"), (b"y", b"new")])?;

    let merged = merge_all(&[oldest, middle, newest])?;
    assert_eq!(
        merged,
        vec![
            (b"k".to_vec(), b"v3".to_vec()),
            (b"x".to_vec(), b"old".to_vec()),
            (b"y".to_vec(), b"new".to_vec()),
        ]
    );
    Ok(())
}

#[test]
fn merge_of_no_tables_is_empty() -> Result<()> {
    let mut merge = MergeIterator::new(Vec::new())?;
    assert!(merge.next_merged()?.is_none());
    Ok(())
}

#[test]
fn compaction_drops_tombstones_when_asked() -> Result<()> {
    let dir = tempdir()?;
    let t1 = write_table(dir.path(), 1, &[(b"a", b"1"), (b"b", b"2"), (b"c", b"3")])?;
    let t2 = write_table(dir.path(), 2, &[(b"b", TOMBSTONE), (b"c", b"33")])?;

    let out = Compactor::new(TombstonePolicy::Drop)
        .compact(&[t1, t2], &table_path(dir.path(), 3))?
        .expect("live entries remain");

    assert_eq!(out.len(), 2);
    assert_eq!(out.get(b"a")?, Some(b"1".to_vec()));
    assert_eq!(out.get(b"b")?, None);
    assert_eq!(out.get(b"c")?, Some(b"33".to_vec()));
    Ok(())
}

#[test]
fn compaction_retains_tombstones_when_asked() -> Result<()> {
    let dir = tempdir()?;
    let t1 = write_table(dir.path(), 1, &[(b"a", b"1"), (b"b", b"2")])?;
    let t2 = write_table(dir.path(), 2, &[(b"b", TOMBSTONE)])?;

    let out = Compactor::new(TombstonePolicy::Retain)
        .compact(&[t1, t2], &table_path(dir.path(), 3))?
        .expect("output written");

    assert_eq!(out.len(), 2);
    assert_eq!(out.get(b"b")?, Some(TOMBSTONE.to_vec()));
    Ok(())
}

#[test]
fn compaction_of_only_tombstones_writes_nothing() -> Result<()> {
    let dir = tempdir()?;
    let t1 = write_table(dir.path(), 1, &[(b"a", b"1")])?;
    let t2 = write_table(dir.path(), 2, &[(b"a", TOMBSTONE)])?;
    let output = table_path(dir.path(), 3);

    let out = Compactor::new(TombstonePolicy::Drop).compact(&[t1, t2], &output)?;
    assert!(out.is_none());
    assert!(!output.exists());
    assert!(tmp_files(dir.path()).is_empty());
    Ok(())
}

#[test]
fn compaction_leaves_inputs_in_place() -> Result<()> {
    let dir = tempdir()?;
    let t1 = write_table(dir.path(), 1, &[(b"a", b"1")])?;
    let t2 = write_table(dir.path(), 2, &[(b"b", b"2")])?;
    let inputs = vec![std::sync::Arc::new(t1), std::sync::Arc::new(t2)];

    let out = Compactor::new(TombstonePolicy::Drop)
        .compact(&inputs, &table_path(dir.path(), 3))?
        .expect("output written");

    assert_eq!(out.len(), 2);
    for t in &inputs {
        assert!(t.path().exists());
    }
    Ok(())
}

#[test]
fn compaction_output_spans_multiple_blocks() -> Result<()> {
    let dir = tempdir()?;
    let entries = numbered(30, 300);
    let (low, high) = entries.split_at(15);
    let t1 = SSTable::build(low.to_vec().into_iter(), &table_path(dir.path(), 1))?;
    let t2 = SSTable::build(high.to_vec().into_iter(), &table_path(dir.path(), 2))?;

    let out = Compactor::new(TombstonePolicy::Drop)
        .compact(&[t1, t2], &table_path(dir.path(), 3))?
        .expect("output written");

    assert_eq!(out.len(), 30);
    assert_eq!(out.block_count(), 3);
    for (k, v) in &entries {
        assert_eq!(out.get(k)?.as_ref(), Some(v));
    }
    Ok(())
}
