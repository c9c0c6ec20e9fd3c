//! Configuration management.
//!
//! Lifelog uses a **per-machine database** architecture: each machine keeps
//! its own derived SQLite store at `~/.lifelog/data/lifelog.db`, rebuilt and
//! reconciled from the git-transported source files. Nothing in this crate
//! ever opens another machine's database; machines meet only through the
//! source files.
//!
//! The machine identifier attributes tombstones and sync checkpoints to the
//! machine that wrote them. It is generated once (uuid v4) and persisted next
//! to the database so it survives reinstalls of the binary.

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the global Lifelog directory location (`~/.lifelog/`).
#[must_use]
pub fn global_lifelog_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".lifelog"))
}

/// Check if test mode is enabled.
///
/// Test mode is enabled by setting `LLOG_TEST_DB=1` (or any non-empty value
/// other than `0`/`false`). This redirects all database operations to an
/// isolated test database.
#[must_use]
pub fn is_test_mode() -> bool {
    std::env::var("LLOG_TEST_DB")
        .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
        .unwrap_or(false)
}

/// Get the test database path (`~/.lifelog/test/lifelog.db`).
#[must_use]
pub fn test_db_path() -> Option<PathBuf> {
    global_lifelog_dir().map(|dir| dir.join("test").join("lifelog.db"))
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `LLOG_TEST_DB` environment variable → uses test database
/// 3. `LLOG_DB` environment variable
/// 4. Global location: `~/.lifelog/data/lifelog.db`
///
/// # Returns
///
/// Returns the path to the database file, or `None` if no location found.
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if is_test_mode() {
        return test_db_path();
    }

    if let Ok(db_path) = std::env::var("LLOG_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    global_lifelog_dir().map(|dir| dir.join("data").join("lifelog.db"))
}

/// Resolve the machine identifier for sync attribution.
///
/// Priority:
/// 1. Explicit `--machine` flag
/// 2. `LLOG_MACHINE` environment variable
/// 3. Persisted id file next to the database (`machine-id`)
/// 4. Generate a uuid v4, persist it, return it
///
/// The persisted id lives beside the database so test-mode runs get their
/// own identity and never pollute the real one.
///
/// # Errors
///
/// Returns an error if the id file cannot be created.
pub fn resolve_machine_id(explicit: Option<&str>, db_path: &Path) -> Result<String> {
    if let Some(id) = explicit {
        if !id.trim().is_empty() {
            return Ok(id.trim().to_string());
        }
    }

    if let Ok(id) = std::env::var("LLOG_MACHINE") {
        if !id.trim().is_empty() {
            return Ok(id.trim().to_string());
        }
    }

    let id_path = machine_id_path(db_path);
    if let Ok(existing) = fs::read_to_string(&id_path) {
        let existing = existing.trim();
        if !existing.is_empty() {
            return Ok(existing.to_string());
        }
    }

    let id = uuid::Uuid::new_v4().to_string();
    if let Some(parent) = id_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&id_path, format!("{id}\n"))
        .map_err(|e| Error::Config(format!("Failed to persist machine id: {e}")))?;
    Ok(id)
}

/// Path of the persisted machine-id file for a given database.
fn machine_id_path(db_path: &Path) -> PathBuf {
    db_path
        .parent()
        .map_or_else(|| PathBuf::from("machine-id"), |p| p.join("machine-id"))
}
