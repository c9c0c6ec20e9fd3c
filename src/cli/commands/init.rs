//! Initialize the Lifelog database.
//!
//! Lifelog uses a **per-machine database**: `llog init` creates the derived
//! SQLite store at `~/.lifelog/data/lifelog.db` (or the path given with
//! `--db` / `LLOG_DB`). The database is never committed to git; only the
//! source files travel between machines. Each machine rebuilds and
//! reconciles its own store with `llog sync apply`.

use crate::config::{is_test_mode, resolve_db_path, resolve_machine_id};
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

#[derive(Serialize)]
struct InitOutput {
    database: PathBuf,
    machine_id: String,
    test_mode: bool,
}

/// Execute the init command.
///
/// Creates the database directory, applies the schema, and persists a
/// machine id beside the database if one does not exist yet.
///
/// # Errors
///
/// Returns `Error::AlreadyInitialized` if the database exists and `--force`
/// was not given, or an error if the database cannot be created.
pub fn execute(
    force: bool,
    db_path: Option<&PathBuf>,
    machine: Option<&str>,
    json: bool,
) -> Result<()> {
    let db_path = resolve_db_path(db_path.map(PathBuf::as_path)).ok_or_else(|| {
        Error::Config("Could not determine the Lifelog data directory".to_string())
    })?;

    if db_path.exists() && !force {
        return Err(Error::AlreadyInitialized { path: db_path });
    }

    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    if force && db_path.exists() {
        fs::remove_file(&db_path)?;
    }

    // Opening applies the schema.
    let _storage = SqliteStorage::open(&db_path)?;
    let machine_id = resolve_machine_id(machine, &db_path)?;

    if json {
        let output = InitOutput {
            database: db_path,
            machine_id,
            test_mode: is_test_mode(),
        };
        let payload = serde_json::to_string(&output)?;
        println!("{payload}");
    } else {
        println!("Initialized Lifelog database");
        println!("  Database: {}", db_path.display());
        println!("  Machine:  {machine_id}");
        println!();
        println!("Next: run 'llog sync apply' after your ingestion pipeline parses the sources.");
    }

    Ok(())
}
