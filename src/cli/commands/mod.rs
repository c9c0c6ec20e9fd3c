//! Command implementations.

use crate::config::resolve_db_path;
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;
use std::path::PathBuf;

pub mod completions;
pub mod conflicts;
pub mod entry;
pub mod init;
pub mod sync;
pub mod tombstone;
pub mod version;

/// Open the database for a command, failing cleanly if uninitialized.
pub(crate) fn open_storage(db_path: Option<&PathBuf>) -> Result<(SqliteStorage, PathBuf)> {
    let path = resolve_db_path(db_path.map(PathBuf::as_path)).ok_or(Error::NotInitialized)?;
    if !path.exists() {
        return Err(Error::NotInitialized);
    }
    let storage = SqliteStorage::open(&path)?;
    Ok((storage, path))
}

/// Render a millisecond timestamp for human output.
pub(crate) fn format_ts(ms: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ms)
        .map_or_else(|| ms.to_string(), |dt| dt.format("%Y-%m-%d %H:%M").to_string())
}
