use super::*;
use tempfile::tempdir;

fn flush_one(engine: &Engine, key: &str, value: &str) -> Result<()> {
    put(engine, key, value)?;
    engine.force_flush()
}

#[test]
fn fourth_flush_compacts_level_zero() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open_with(dir.path(), EngineConfig::default().with_wal_sync(false))?;

    for (i, key) in ["alpha", "bravo", "charlie"].iter().enumerate() {
        flush_one(&engine, key, &i.to_string())?;
    }
    assert_eq!(engine.level_file_count(0), 3);
    assert_eq!(engine.level_file_count(1), 0);

    flush_one(&engine, "delta", "3")?;
    assert_eq!(engine.level_file_count(0), 0);
    assert_eq!(engine.level_file_count(1), 1);
    assert_eq!(count_tables(dir.path()), 1);

    for (i, key) in ["alpha", "bravo", "charlie", "delta"].iter().enumerate() {
        assert_eq!(get(&engine, key)?, Some(i.to_string()));
    }
    Ok(())
}

#[test]
fn level_one_cascades_into_level_two() -> Result<()> {
    let dir = tempdir()?;
    let config = quiet_config()
        .with_l0_compaction_trigger(1)
        .with_l1_compaction_trigger(3);
    let engine = Engine::open_with(dir.path(), config)?;

    flush_one(&engine, "a", "1")?;
    flush_one(&engine, "b", "2")?;
    assert_eq!(engine.level_file_count(0), 0);
    assert_eq!(engine.level_file_count(1), 2);

    flush_one(&engine, "c", "3")?;
    assert_eq!(engine.level_file_count(1), 0);
    assert_eq!(engine.level_file_count(2), 1);
    assert_eq!(count_tables(dir.path()), 1);

    for (k, v) in [("a", "1"), ("b", "2"), ("c", "3")] {
        assert_eq!(get(&engine, k)?.as_deref(), Some(v));
    }
    Ok(())
}

#[test]
fn newer_value_wins_after_compaction() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_quiet(dir.path())?;

    flush_one(&engine, "k", "v1")?;
    flush_one(&engine, "k", "v2")?;
    flush_one(&engine, "k", "v3")?;
    engine.compact_level(0)?;

    assert_eq!(engine.level_file_count(1), 1);
    assert_eq!(get(&engine, "k")?.as_deref(), Some("v3"));
    Ok(())
}

#[test]
fn newest_level_one_table_wins() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_quiet(dir.path())?;

    flush_one(&engine, "k", "first")?;
    engine.compact_level(0)?;
    flush_one(&engine, "k", "second")?;
    engine.compact_level(0)?;

    assert_eq!(engine.level_file_count(1), 2);
    assert_eq!(get(&engine, "k")?.as_deref(), Some("second"));

    engine.compact_level(1)?;
    assert_eq!(engine.level_file_count(2), 1);
    assert_eq!(get(&engine, "k")?.as_deref(), Some("second"));
    Ok(())
}

#[test]
fn tombstones_are_dropped_when_nothing_older_remains() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_quiet(dir.path())?;

    flush_one(&engine, "gone", "v")?;
    engine.delete(b"gone".to_vec())?;
    engine.force_flush()?;
    engine.compact_level(0)?;

    // Only a tombstone survived the merge, so nothing was written.
    assert_eq!(engine.level_file_count(0), 0);
    assert_eq!(engine.level_file_count(1), 0);
    assert_eq!(count_tables(dir.path()), 0);
    assert_eq!(get(&engine, "gone")?, None);
    Ok(())
}

#[test]
fn tombstones_survive_while_older_levels_hold_the_key() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_quiet(dir.path())?;

    flush_one(&engine, "k", "old")?;
    engine.compact_level(0)?;
    engine.compact_level(1)?;
    assert_eq!(engine.level_file_count(2), 1);

    engine.delete(b"k".to_vec())?;
    engine.force_flush()?;
    engine.compact_level(0)?;
    assert_eq!(engine.level_file_count(1), 1);
    assert_eq!(get(&engine, "k")?, None);

    engine.compact_level(1)?;
    assert_eq!(engine.level_file_count(2), 2);
    assert_eq!(get(&engine, "k")?, None);
    Ok(())
}

#[test]
fn compacting_empty_level_is_noop() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_quiet(dir.path())?;

    engine.compact_level(0)?;
    assert_eq!(engine.total_files(), 0);
    Ok(())
}

#[test]
fn last_level_cannot_be_compacted() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open_with(dir.path(), quiet_config().with_max_level(3))?;

    let err = engine.compact_level(2).unwrap_err();
    assert!(err.to_string().contains("last level"));
    assert!(engine.compact_level(1).is_ok());
    Ok(())
}

#[test]
fn compaction_result_survives_reopen() -> Result<()> {
    let dir = tempdir()?;
    {
        let engine = Engine::open_with(dir.path(), EngineConfig::default().with_wal_sync(false))?;
        for i in 0..4 {
            flush_one(&engine, &format!("k{i}"), &format!("v{i}"))?;
        }
        engine.close()?;
    }

    let engine = Engine::open_with(dir.path(), EngineConfig::default().with_wal_sync(false))?;
    assert_eq!(engine.level_file_count(0), 0);
    assert_eq!(engine.level_file_count(1), 1);
    for i in 0..4 {
        assert_eq!(get(&engine, &format!("k{i}"))?, Some(format!("v{i}")));
    }
    Ok(())
}
