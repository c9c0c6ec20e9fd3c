//! Database schema definitions.
//!
//! The derived store holds the journal domain tables plus the two sync
//! tables this subsystem owns: `tombstones` and `sync_state`. Soft-delete
//! columns live directly on `entries`, the guarded entity table.

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the Lifelog database.
///
/// Timestamps are stored as INTEGER Unix milliseconds.
pub const SCHEMA_SQL: &str = r"
-- ====================
-- Schema Version Tracking
-- ====================

CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- ====================
-- Domain Tables
-- ====================

-- Entries: the guarded (soft-deletable) primary entity
CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    body TEXT,
    status TEXT,
    source_path TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    deleted_at INTEGER,
    deleted_by TEXT,
    deletion_reason TEXT
);

CREATE INDEX IF NOT EXISTS idx_entries_deleted ON entries(deleted_at);
CREATE INDEX IF NOT EXISTS idx_entries_source ON entries(source_path);

CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS people (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS locations (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

-- Association tables: entry id is always the left column, matching the
-- canonical (left_id, right_id) order used by tombstones.
CREATE TABLE IF NOT EXISTS entry_tags (
    entry_id INTEGER NOT NULL,
    tag_id INTEGER NOT NULL,
    PRIMARY KEY (entry_id, tag_id),
    FOREIGN KEY (entry_id) REFERENCES entries(id) ON DELETE CASCADE,
    FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS entry_people (
    entry_id INTEGER NOT NULL,
    person_id INTEGER NOT NULL,
    PRIMARY KEY (entry_id, person_id),
    FOREIGN KEY (entry_id) REFERENCES entries(id) ON DELETE CASCADE,
    FOREIGN KEY (person_id) REFERENCES people(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS entry_locations (
    entry_id INTEGER NOT NULL,
    location_id INTEGER NOT NULL,
    PRIMARY KEY (entry_id, location_id),
    FOREIGN KEY (entry_id) REFERENCES entries(id) ON DELETE CASCADE,
    FOREIGN KEY (location_id) REFERENCES locations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_entry_tags_tag ON entry_tags(tag_id);
CREATE INDEX IF NOT EXISTS idx_entry_people_person ON entry_people(person_id);
CREATE INDEX IF NOT EXISTS idx_entry_locations_location ON entry_locations(location_id);

-- ====================
-- Sync Tables
-- ====================

-- Tombstones: deliberately severed associations. At most one live row per
-- (table_name, left_id, right_id); create refreshes instead of duplicating.
CREATE TABLE IF NOT EXISTS tombstones (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    table_name TEXT NOT NULL,
    left_id INTEGER NOT NULL,
    right_id INTEGER NOT NULL,
    removed_at INTEGER NOT NULL,
    removed_by TEXT NOT NULL,
    sync_source TEXT NOT NULL,
    reason TEXT,
    expires_at INTEGER,
    UNIQUE(table_name, left_id, right_id)
);

CREATE INDEX IF NOT EXISTS idx_tombstones_table ON tombstones(table_name);
CREATE INDEX IF NOT EXISTS idx_tombstones_expires ON tombstones(expires_at);

-- Sync state: one checkpoint per (entity_type, entity_id, sync_source).
-- Rows are never deleted by normal operation.
CREATE TABLE IF NOT EXISTS sync_state (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type TEXT NOT NULL,
    entity_id INTEGER NOT NULL,
    sync_source TEXT NOT NULL,
    sync_hash TEXT NOT NULL,
    machine_id TEXT NOT NULL,
    synced_at INTEGER NOT NULL,
    conflict_detected INTEGER NOT NULL DEFAULT 0,
    conflict_resolved_at INTEGER,
    UNIQUE(entity_type, entity_id, sync_source)
);

CREATE INDEX IF NOT EXISTS idx_sync_state_entity ON sync_state(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS idx_sync_state_conflicts ON sync_state(conflict_detected);
CREATE INDEX IF NOT EXISTS idx_sync_state_machine ON sync_state(machine_id);

-- ====================
-- Audit Events
-- ====================

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    actor TEXT NOT NULL,
    old_value TEXT,
    new_value TEXT,
    comment TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS idx_events_created ON events(created_at DESC);
";

/// Apply the schema to the database.
///
/// Uses `execute_batch` for the DDL script; idempotent because every
/// statement uses `IF NOT EXISTS`.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_schema() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("Failed to apply schema");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();

        assert!(tables.contains(&"entries".to_string()));
        assert!(tables.contains(&"tags".to_string()));
        assert!(tables.contains(&"entry_tags".to_string()));
        assert!(tables.contains(&"tombstones".to_string()));
        assert!(tables.contains(&"sync_state".to_string()));
        assert!(tables.contains(&"events".to_string()));
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("First apply failed");
        apply_schema(&conn).expect("Second apply failed");
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let fk_enabled: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk_enabled, 1);
    }

    #[test]
    fn test_tombstone_uniqueness() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO tombstones (table_name, left_id, right_id, removed_at, removed_by, sync_source)
             VALUES ('entry_tags', 1, 2, 0, 'm', 'yaml')",
            [],
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO tombstones (table_name, left_id, right_id, removed_at, removed_by, sync_source)
             VALUES ('entry_tags', 1, 2, 1, 'm', 'yaml')",
            [],
        );
        assert!(dup.is_err());
    }

    #[test]
    fn test_sync_state_uniqueness() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO sync_state (entity_type, entity_id, sync_source, sync_hash, machine_id, synced_at)
             VALUES ('entry', 1, 'yaml', 'abc', 'm', 0)",
            [],
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO sync_state (entity_type, entity_id, sync_source, sync_hash, machine_id, synced_at)
             VALUES ('entry', 1, 'yaml', 'def', 'm', 1)",
            [],
        );
        assert!(dup.is_err());
    }
}
