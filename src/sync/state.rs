//! Sync state store: per-entity checkpoints for conflict detection.
//!
//! One row per (entity type, entity id, sync source) holds the fingerprint
//! recorded at the last successful sync. A later sync whose freshly computed
//! fingerprint differs from the stored one means the entity diverged between
//! synchronizations. The write still proceeds (last-write-wins), but the
//! divergence is flagged and stays flagged until explicitly resolved.
//!
//! Rows are never deleted by normal operation; the table doubles as an
//! audit trail of which machine synced what, when.

use crate::error::{Error, Result};
use crate::model::{EntityType, SyncSource};
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeMap;

/// One sync checkpoint row.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SyncState {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: i64,
    pub sync_source: String,
    pub sync_hash: String,
    pub machine_id: String,
    pub synced_at: i64,
    /// Sticky: once set, survives further successful syncs until resolved.
    pub conflict_detected: bool,
    pub conflict_resolved_at: Option<i64>,
}

/// Aggregate counts for reporting.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SyncStateStats {
    pub total: usize,
    pub unresolved_conflicts: usize,
    pub resolved_conflicts: usize,
    /// (entity_type, checkpoint count), descending.
    pub by_type: Vec<(String, usize)>,
    /// (sync_source, checkpoint count), descending.
    pub by_source: Vec<(String, usize)>,
    /// (machine_id, checkpoint count), descending.
    pub by_machine: Vec<(String, usize)>,
}

/// Store over the `sync_state` table.
///
/// Borrows a connection so it can run inside the coordinator's transaction
/// or standalone from the CLI.
pub struct SyncStateStore<'c> {
    conn: &'c Connection,
}

impl<'c> SyncStateStore<'c> {
    /// Create a store over an existing connection.
    #[must_use]
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Upsert the checkpoint for one (entity, source).
    ///
    /// Overwrites hash, machine, and timestamp (storage-layer
    /// last-write-wins). An existing `conflict_detected = true` is
    /// preserved; the flag only clears through [`Self::resolve`]. A fresh
    /// conflict passed in sets it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn record(
        &self,
        entity_type: EntityType,
        entity_id: i64,
        sync_source: SyncSource,
        sync_hash: &str,
        machine_id: &str,
        conflict_detected: bool,
    ) -> Result<SyncState> {
        let now = chrono::Utc::now().timestamp_millis();
        self.conn.execute(
            "INSERT INTO sync_state (entity_type, entity_id, sync_source, sync_hash, machine_id, synced_at, conflict_detected)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(entity_type, entity_id, sync_source) DO UPDATE SET
                sync_hash = excluded.sync_hash,
                machine_id = excluded.machine_id,
                synced_at = excluded.synced_at,
                conflict_detected = MAX(sync_state.conflict_detected, excluded.conflict_detected)",
            rusqlite::params![
                entity_type.as_str(),
                entity_id,
                sync_source.as_str(),
                sync_hash,
                machine_id,
                now,
                i32::from(conflict_detected),
            ],
        )?;

        self.get_one(entity_type, entity_id, sync_source)?
            .ok_or_else(|| Error::Other("sync state vanished after upsert".to_string()))
    }

    /// Whether an incoming fingerprint diverges from the stored checkpoint.
    ///
    /// Pure read. A missing prior checkpoint is never a conflict; the
    /// first sync from a source cannot diverge from anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn check_conflict(
        &self,
        entity_type: EntityType,
        entity_id: i64,
        sync_source: SyncSource,
        incoming_hash: &str,
    ) -> Result<bool> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT sync_hash FROM sync_state
                 WHERE entity_type = ?1 AND entity_id = ?2 AND sync_source = ?3",
                rusqlite::params![entity_type.as_str(), entity_id, sync_source.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(stored.is_some_and(|h| h != incoming_hash))
    }

    /// Fetch the checkpoint for one (entity, source).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_one(
        &self,
        entity_type: EntityType,
        entity_id: i64,
        sync_source: SyncSource,
    ) -> Result<Option<SyncState>> {
        self.conn
            .query_row(
                "SELECT id, entity_type, entity_id, sync_source, sync_hash, machine_id, synced_at, conflict_detected, conflict_resolved_at
                 FROM sync_state
                 WHERE entity_type = ?1 AND entity_id = ?2 AND sync_source = ?3",
                rusqlite::params![entity_type.as_str(), entity_id, sync_source.as_str()],
                state_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    /// Fetch checkpoints for an entity: one source, or all sources if
    /// omitted.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(
        &self,
        entity_type: EntityType,
        entity_id: i64,
        sync_source: Option<SyncSource>,
    ) -> Result<Vec<SyncState>> {
        match sync_source {
            Some(source) => Ok(self
                .get_one(entity_type, entity_id, source)?
                .into_iter()
                .collect()),
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, entity_type, entity_id, sync_source, sync_hash, machine_id, synced_at, conflict_detected, conflict_resolved_at
                     FROM sync_state
                     WHERE entity_type = ?1 AND entity_id = ?2
                     ORDER BY sync_source",
                )?;
                let rows = stmt.query_map(
                    rusqlite::params![entity_type.as_str(), entity_id],
                    state_from_row,
                )?;
                rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
            }
        }
    }

    /// Clear `conflict_detected` and stamp `conflict_resolved_at` for all
    /// sources of the entity.
    ///
    /// Explicit only; nothing in the sync path ever calls this. Returns the
    /// number of checkpoints cleared.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn resolve(&self, entity_type: EntityType, entity_id: i64) -> Result<usize> {
        let now = chrono::Utc::now().timestamp_millis();
        let cleared = self.conn.execute(
            "UPDATE sync_state SET conflict_detected = 0, conflict_resolved_at = ?1
             WHERE entity_type = ?2 AND entity_id = ?3 AND conflict_detected = 1",
            rusqlite::params![now, entity_type.as_str(), entity_id],
        )?;
        Ok(cleared)
    }

    /// All checkpoints with an unresolved conflict, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_conflicts(&self) -> Result<Vec<SyncState>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, entity_type, entity_id, sync_source, sync_hash, machine_id, synced_at, conflict_detected, conflict_resolved_at
             FROM sync_state WHERE conflict_detected = 1
             ORDER BY synced_at DESC",
        )?;
        let rows = stmt.query_map([], state_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Aggregate counts for reporting.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn stats(&self) -> Result<SyncStateStats> {
        let total: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sync_state", [], |row| row.get(0))?;
        let unresolved: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sync_state WHERE conflict_detected = 1",
            [],
            |row| row.get(0),
        )?;
        let resolved: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sync_state WHERE conflict_detected = 0 AND conflict_resolved_at IS NOT NULL",
            [],
            |row| row.get(0),
        )?;

        Ok(SyncStateStats {
            total: usize::try_from(total).unwrap_or(0),
            unresolved_conflicts: usize::try_from(unresolved).unwrap_or(0),
            resolved_conflicts: usize::try_from(resolved).unwrap_or(0),
            by_type: self.group_count("entity_type")?,
            by_source: self.group_count("sync_source")?,
            by_machine: self.group_count("machine_id")?,
        })
    }

    fn group_count(&self, column: &str) -> Result<Vec<(String, usize)>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {column}, COUNT(*) FROM sync_state GROUP BY {column} ORDER BY COUNT(*) DESC"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (key, count) = row?;
            out.push((key, usize::try_from(count).unwrap_or(0)));
        }
        Ok(out)
    }

    /// Entity ids previously checkpointed from a source, for prune-missing.
    ///
    /// Maps entity id to its latest stored hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn checkpointed_ids(
        &self,
        entity_type: EntityType,
        sync_source: SyncSource,
    ) -> Result<BTreeMap<i64, String>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id, sync_hash FROM sync_state
             WHERE entity_type = ?1 AND sync_source = ?2",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![entity_type.as_str(), sync_source.as_str()],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        )?;
        rows.collect::<rusqlite::Result<BTreeMap<_, _>>>()
            .map_err(Error::from)
    }
}

fn state_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncState> {
    Ok(SyncState {
        id: row.get(0)?,
        entity_type: row.get(1)?,
        entity_id: row.get(2)?,
        sync_source: row.get(3)?,
        sync_hash: row.get(4)?,
        machine_id: row.get(5)?,
        synced_at: row.get(6)?,
        conflict_detected: row.get::<_, i32>(7)? != 0,
        conflict_resolved_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;

    #[test]
    fn test_first_sync_is_never_a_conflict() {
        let storage = SqliteStorage::open_memory().unwrap();
        let store = SyncStateStore::new(storage.conn());

        assert!(!store
            .check_conflict(EntityType::Entry, 1, SyncSource::Yaml, "abc")
            .unwrap());
    }

    #[test]
    fn test_check_conflict_iff_hash_differs() {
        let storage = SqliteStorage::open_memory().unwrap();
        let store = SyncStateStore::new(storage.conn());

        store
            .record(EntityType::Entry, 1, SyncSource::Yaml, "xyz", "m", false)
            .unwrap();

        assert!(store
            .check_conflict(EntityType::Entry, 1, SyncSource::Yaml, "def")
            .unwrap());
        assert!(!store
            .check_conflict(EntityType::Entry, 1, SyncSource::Yaml, "xyz")
            .unwrap());
        // other source is an independent track
        assert!(!store
            .check_conflict(EntityType::Entry, 1, SyncSource::Wiki, "def")
            .unwrap());
    }

    #[test]
    fn test_conflict_flag_is_sticky_across_records() {
        let storage = SqliteStorage::open_memory().unwrap();
        let store = SyncStateStore::new(storage.conn());

        store
            .record(EntityType::Entry, 1, SyncSource::Yaml, "a", "m", true)
            .unwrap();
        let state = store
            .record(EntityType::Entry, 1, SyncSource::Yaml, "b", "m", false)
            .unwrap();

        assert!(state.conflict_detected);
        assert_eq!(state.sync_hash, "b");
    }

    #[test]
    fn test_resolve_clears_and_stays_cleared() {
        let storage = SqliteStorage::open_memory().unwrap();
        let store = SyncStateStore::new(storage.conn());

        store
            .record(EntityType::Entry, 1, SyncSource::Yaml, "a", "m", true)
            .unwrap();
        store
            .record(EntityType::Entry, 1, SyncSource::Wiki, "w", "m", true)
            .unwrap();

        assert_eq!(store.resolve(EntityType::Entry, 1).unwrap(), 2);
        assert!(store.list_conflicts().unwrap().is_empty());

        // a later clean record does not re-flag
        let state = store
            .record(EntityType::Entry, 1, SyncSource::Yaml, "c", "m", false)
            .unwrap();
        assert!(!state.conflict_detected);
        assert!(state.conflict_resolved_at.is_some());
    }

    #[test]
    fn test_record_overwrites_machine_and_hash() {
        let storage = SqliteStorage::open_memory().unwrap();
        let store = SyncStateStore::new(storage.conn());

        store
            .record(EntityType::Entry, 1, SyncSource::Yaml, "a", "laptop", false)
            .unwrap();
        let state = store
            .record(EntityType::Entry, 1, SyncSource::Yaml, "b", "desktop", false)
            .unwrap();

        assert_eq!(state.sync_hash, "b");
        assert_eq!(state.machine_id, "desktop");
        // still a single row
        assert_eq!(store.stats().unwrap().total, 1);
    }

    #[test]
    fn test_get_all_sources() {
        let storage = SqliteStorage::open_memory().unwrap();
        let store = SyncStateStore::new(storage.conn());

        store
            .record(EntityType::Entry, 1, SyncSource::Yaml, "a", "m", false)
            .unwrap();
        store
            .record(EntityType::Entry, 1, SyncSource::Wiki, "b", "m", false)
            .unwrap();

        assert_eq!(store.get(EntityType::Entry, 1, None).unwrap().len(), 2);
        assert_eq!(
            store
                .get(EntityType::Entry, 1, Some(SyncSource::Wiki))
                .unwrap()
                .len(),
            1
        );
        assert!(store.get(EntityType::Entry, 2, None).unwrap().is_empty());
    }

    #[test]
    fn test_stats_breakdowns() {
        let storage = SqliteStorage::open_memory().unwrap();
        let store = SyncStateStore::new(storage.conn());

        store
            .record(EntityType::Entry, 1, SyncSource::Yaml, "a", "laptop", true)
            .unwrap();
        store
            .record(EntityType::Entry, 2, SyncSource::Yaml, "b", "laptop", false)
            .unwrap();
        store
            .record(EntityType::Tag, 3, SyncSource::Wiki, "c", "desktop", false)
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.unresolved_conflicts, 1);
        assert_eq!(stats.by_type[0], ("entry".to_string(), 2));
        assert_eq!(stats.by_machine[0], ("laptop".to_string(), 2));
    }
}
