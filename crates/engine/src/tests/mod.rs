use anyhow::Result;
use config::EngineConfig;
use std::fs;
use std::path::Path;

use crate::Engine;

mod compaction_tests;

/// Small memtable, no fsync, automatic compaction off.
fn quiet_config() -> EngineConfig {
    EngineConfig::default()
        .with_wal_sync(false)
        .with_l0_compaction_trigger(0)
        .with_l1_compaction_trigger(0)
}

fn open_quiet(dir: &Path) -> Result<Engine> {
    Engine::open_with(dir, quiet_config())
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .collect();
    names.sort();
    names
}

fn count_tables(dir: &Path) -> usize {
    file_names(dir)
        .iter()
        .filter(|n| sstable::is_table_file(Path::new(n.as_str())))
        .count()
}

fn count_segments(dir: &Path) -> usize {
    wal::list_segments(dir).unwrap().len()
}

fn put(engine: &Engine, key: &str, value: &str) -> Result<()> {
    engine.put(key.as_bytes().to_vec(), value.as_bytes().to_vec())
}

fn get(engine: &Engine, key: &str) -> Result<Option<String>> {
    Ok(engine
        .get(key.as_bytes())?
        .map(|v| String::from_utf8(v).unwrap()))
}
