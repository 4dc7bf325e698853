//! # CLI - interactive shell for the storage engine
//!
//! Reads commands from stdin, runs them against an [`Engine`], and prints
//! one result line per command to stdout. Works interactively or with
//! commands piped in.
//!
//! ## Commands
//!
//! ```text
//! PUT key value      Insert or update a key (SET is an alias)
//! GET key            Print the value or "(nil)"
//! DEL key            Delete a key (writes a tombstone)
//! FLUSH              Flush every memtable to level 0
//! COMPACT level      Compact a level into the next one
//! STATS              Print engine state
//! EXIT / QUIT        Flush and shut down
//! ```
//!
//! Results are `OK`, a value, `(nil)`, or `ERR <reason>`.
//!
//! ## Configuration
//!
//! Read from `LSM_*` environment variables, see [`config::EngineConfig`].
//! Logs go to stderr, filtered by `RUST_LOG` (default `warn`).
//!
//! ## Example
//!
//! ```text
//! $ LSM_DATA_DIR=/tmp/lsm cargo run -p cli
//! > PUT name Alice
//! OK
//! > GET name
//! Alice
//! > EXIT
//! bye
//! ```

use anyhow::Result;
use config::EngineConfig;
use engine::Engine;
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Put(String, String),
    Get(String),
    Del(String),
    Flush,
    Compact(usize),
    Stats,
    Exit,
}

/// Parses one input line. `Ok(None)` for a blank line.
fn parse(line: &str) -> std::result::Result<Option<Command>, String> {
    let mut parts = line.split_whitespace();
    let cmd = match parts.next() {
        Some(cmd) => cmd.to_uppercase(),
        None => return Ok(None),
    };

    let command = match cmd.as_str() {
        "PUT" | "SET" => {
            let key = parts.next().ok_or("usage: PUT key value")?;
            let value = parts.collect::<Vec<&str>>().join(" ");
            if value.is_empty() {
                return Err("usage: PUT key value".to_string());
            }
            Command::Put(key.to_string(), value)
        }
        "GET" => Command::Get(parts.next().ok_or("usage: GET key")?.to_string()),
        "DEL" => Command::Del(parts.next().ok_or("usage: DEL key")?.to_string()),
        "FLUSH" => Command::Flush,
        "COMPACT" => {
            let level = parts
                .next()
                .and_then(|l| l.parse().ok())
                .ok_or("usage: COMPACT level")?;
            Command::Compact(level)
        }
        "STATS" => Command::Stats,
        "EXIT" | "QUIT" => Command::Exit,
        other => return Err(format!("unknown command: {other}")),
    };
    Ok(Some(command))
}

/// Runs `command` and returns the line to print.
fn execute(engine: &Engine, command: Command) -> String {
    let result = match command {
        Command::Put(k, v) => engine
            .put(k.into_bytes(), v.into_bytes())
            .map(|()| "OK".to_string()),
        Command::Get(k) => engine.get(k.as_bytes()).map(|v| match v {
            Some(v) => String::from_utf8_lossy(&v).into_owned(),
            None => "(nil)".to_string(),
        }),
        Command::Del(k) => engine.delete(k.into_bytes()).map(|()| "OK".to_string()),
        Command::Flush => engine
            .force_flush()
            .map(|()| format!("OK (L0={})", engine.level_file_count(0))),
        Command::Compact(level) => engine.compact_level(level).map(|()| {
            format!(
                "OK (L{level}={}, L{}={})",
                engine.level_file_count(level),
                level + 1,
                engine.level_file_count(level + 1)
            )
        }),
        Command::Stats => Ok(format!("{engine:?}")),
        Command::Exit => Ok("bye".to_string()),
    };
    result.unwrap_or_else(|e| format!("ERR {e:#}"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let (data_dir, config) = EngineConfig::from_env();
    let engine = Engine::open_with(&data_dir, config)?;
    tracing::info!(dir = %data_dir.display(), "shell started");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    write!(stdout, "> ")?;
    stdout.flush()?;

    for line in stdin.lock().lines() {
        let line = line?;
        match parse(&line) {
            Ok(None) => {}
            Ok(Some(Command::Exit)) => {
                writeln!(stdout, "bye")?;
                break;
            }
            Ok(Some(command)) => writeln!(stdout, "{}", execute(&engine, command))?,
            Err(usage) => writeln!(stdout, "ERR {usage}")?,
        }
        write!(stdout, "> ")?;
        stdout.flush()?;
    }

    engine.close()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_commands() {
        assert_eq!(
            parse("put k hello world"),
            Ok(Some(Command::Put("k".into(), "hello world".into())))
        );
        assert_eq!(parse("SET k v"), Ok(Some(Command::Put("k".into(), "v".into()))));
        assert_eq!(parse("GET k"), Ok(Some(Command::Get("k".into()))));
        assert_eq!(parse("del k"), Ok(Some(Command::Del("k".into()))));
        assert_eq!(parse("FLUSH"), Ok(Some(Command::Flush)));
        assert_eq!(parse("COMPACT 1"), Ok(Some(Command::Compact(1))));
        assert_eq!(parse("stats"), Ok(Some(Command::Stats)));
        assert_eq!(parse("quit"), Ok(Some(Command::Exit)));
        assert_eq!(parse("   "), Ok(None));
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(parse("PUT k").is_err());
        assert!(parse("GET").is_err());
        assert!(parse("COMPACT").is_err());
        assert!(parse("COMPACT one").is_err());
        assert_eq!(parse("FROB"), Err("unknown command: FROB".to_string()));
    }

    #[test]
    fn execute_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::open_with(dir.path(), EngineConfig::default()).unwrap();

        assert_eq!(execute(&engine, Command::Get("k".into())), "(nil)");
        assert_eq!(execute(&engine, Command::Put("k".into(), "v".into())), "OK");
        assert_eq!(execute(&engine, Command::Get("k".into())), "v");
        assert_eq!(execute(&engine, Command::Flush), "OK (L0=1)");
        assert_eq!(execute(&engine, Command::Del("k".into())), "OK");
        assert_eq!(execute(&engine, Command::Get("k".into())), "(nil)");
        assert!(execute(&engine, Command::Compact(6)).starts_with("ERR"));
        assert!(execute(&engine, Command::Stats).starts_with("Engine"));
    }
}
