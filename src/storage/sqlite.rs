//! SQLite storage implementation.
//!
//! This module provides the storage backend for the derived journal store.
//! It follows a MutationContext pattern for transaction discipline: every
//! mutation runs inside one IMMEDIATE transaction, audit events are written
//! at commit, and a failure rolls the whole unit back. The coordinator
//! relies on this to keep a failed reconciliation from leaving half-updated
//! associations behind.
//!
//! Storage handles are injected explicitly; there are no ambient globals.

use crate::error::{Error, Result};
use crate::model::{Entry, EntityType, Relationship};
use crate::storage::events::{insert_event, Event, EventType};
use crate::storage::schema::apply_schema;
use rusqlite::{Connection, OptionalExtension, Transaction};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// Context for a mutation operation, tracking side effects.
///
/// Passed to mutation closures to record audit events that are written
/// together with the data changes, inside the same transaction.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Actor performing the operation (machine id, user).
    pub actor: String,
    /// Events to write at the end of the transaction.
    pub events: Vec<Event>,
}

impl MutationContext {
    /// Create a new mutation context.
    #[must_use]
    pub fn new(op_name: &str, actor: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor: actor.to_string(),
            events: Vec::new(),
        }
    }

    /// Record an event for this operation.
    pub fn record_event(&mut self, entity_type: &str, entity_id: &str, event_type: EventType) {
        self.events
            .push(Event::new(entity_type, entity_id, event_type, &self.actor));
    }

    /// Record an event with a comment.
    pub fn record_event_with_comment(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        event_type: EventType,
        comment: &str,
    ) {
        self.events.push(
            Event::new(entity_type, entity_id, event_type, &self.actor).with_comment(comment),
        );
    }
}

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// This method:
    /// 1. Begins an IMMEDIATE transaction (for write locking)
    /// 2. Executes the mutation closure
    /// 3. Writes audit events
    /// 4. Commits (or rolls back on error)
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back on
    /// error, so a failing closure leaves no partial writes behind.
    pub fn mutate<F, R>(&mut self, op: &str, actor: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let mut ctx = MutationContext::new(op, actor);
        let result = f(&tx, &mut ctx)?;

        for event in &ctx.events {
            insert_event(&tx, event)?;
        }

        tx.commit()?;
        Ok(result)
    }

    // ==================
    // Entry Operations
    // ==================

    /// Get an entry by id, including soft-deleted rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_entry(&self, id: i64) -> Result<Option<Entry>> {
        get_entry(&self.conn, id)
    }

    /// List entries, newest first. Soft-deleted rows are excluded unless
    /// `include_deleted` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_entries(&self, include_deleted: bool, limit: Option<u32>) -> Result<Vec<Entry>> {
        let limit = limit.unwrap_or(100);
        let sql = if include_deleted {
            "SELECT id, title, body, status, source_path, created_at, updated_at,
                    deleted_at, deleted_by, deletion_reason
             FROM entries ORDER BY updated_at DESC LIMIT ?1"
        } else {
            "SELECT id, title, body, status, source_path, created_at, updated_at,
                    deleted_at, deleted_by, deletion_reason
             FROM entries WHERE deleted_at IS NULL ORDER BY updated_at DESC LIMIT ?1"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([limit], entry_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Soft-delete an entry: set the deletion triple, leave associations
    /// intact. Returns false if the entry was already deleted.
    ///
    /// # Errors
    ///
    /// Returns `Error::EntryNotFound` if no such entry exists.
    pub fn soft_delete_entry(
        &mut self,
        id: i64,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<bool> {
        let reason = reason.map(ToString::to_string);
        self.mutate("entry_soft_delete", actor, |tx, ctx| {
            let actor = ctx.actor.clone();
            let deleted = soft_delete_entry(tx, id, &actor, reason.as_deref())?;
            if deleted {
                ctx.record_event("entry", &id.to_string(), EventType::EntitySoftDeleted);
            }
            Ok(deleted)
        })
    }

    /// Restore a soft-deleted entry: clear all three deletion fields
    /// atomically. Associations are untouched. Returns false if the entry
    /// was not deleted.
    ///
    /// # Errors
    ///
    /// Returns `Error::EntryNotFound` if no such entry exists.
    pub fn restore_entry(&mut self, id: i64, actor: &str) -> Result<bool> {
        self.mutate("entry_restore", actor, |tx, ctx| {
            let restored = restore_entry(tx, id)?;
            if restored {
                ctx.record_event("entry", &id.to_string(), EventType::EntityRestored);
            }
            Ok(restored)
        })
    }
}

// ==================
// Row-level helpers
//
// Free functions over `&Connection` so the coordinator can call them inside
// its own transaction (a `Transaction` derefs to `Connection`).
// ==================

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entry> {
    Ok(Entry {
        id: row.get(0)?,
        title: row.get(1)?,
        body: row.get(2)?,
        status: row.get(3)?,
        source_path: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        deleted_at: row.get(7)?,
        deleted_by: row.get(8)?,
        deletion_reason: row.get(9)?,
    })
}

/// Get an entry by id, including soft-deleted rows.
pub fn get_entry(conn: &Connection, id: i64) -> Result<Option<Entry>> {
    conn.query_row(
        "SELECT id, title, body, status, source_path, created_at, updated_at,
                deleted_at, deleted_by, deletion_reason
         FROM entries WHERE id = ?1",
        [id],
        entry_from_row,
    )
    .optional()
    .map_err(Error::from)
}

/// Insert or update an entity's scalar columns from parsed source.
///
/// The source is authoritative: known scalar columns are overwritten from
/// the map; absent keys clear the column. No field-level merge.
///
/// Returns the entity's row id (the fresh rowid on insert).
///
/// # Errors
///
/// Returns `Error::RequiredField` if the type's required scalar is missing,
/// or `Error::EntryNotFound` when updating a nonexistent entry.
pub fn upsert_entity_scalars(
    conn: &Connection,
    entity_type: EntityType,
    entity_id: Option<i64>,
    scalars: &std::collections::BTreeMap<String, serde_json::Value>,
    source_path: Option<&str>,
) -> Result<i64> {
    let now = chrono::Utc::now().timestamp_millis();

    match entity_type {
        EntityType::Entry => {
            let title = scalar_str(scalars, "title")
                .ok_or_else(|| Error::RequiredField("title".to_string()))?;
            let body = scalar_str(scalars, "body");
            let status = scalar_str(scalars, "status");

            if let Some(id) = entity_id {
                let changed = conn.execute(
                    "UPDATE entries SET title = ?1, body = ?2, status = ?3,
                            source_path = COALESCE(?4, source_path), updated_at = ?5
                     WHERE id = ?6",
                    rusqlite::params![title, body, status, source_path, now, id],
                )?;
                if changed == 0 {
                    return Err(Error::EntryNotFound { id });
                }
                Ok(id)
            } else {
                conn.execute(
                    "INSERT INTO entries (title, body, status, source_path, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                    rusqlite::params![title, body, status, source_path, now],
                )?;
                Ok(conn.last_insert_rowid())
            }
        }
        EntityType::Person | EntityType::Location | EntityType::Tag => {
            let name = scalar_str(scalars, "name")
                .ok_or_else(|| Error::RequiredField("name".to_string()))?;
            let table = match entity_type {
                EntityType::Person => "people",
                EntityType::Location => "locations",
                EntityType::Tag => "tags",
                EntityType::Entry => unreachable!(),
            };

            if let Some(id) = entity_id {
                conn.execute(
                    &format!("UPDATE {table} SET name = ?1 WHERE id = ?2"),
                    rusqlite::params![name, id],
                )?;
                Ok(id)
            } else {
                conn.execute(
                    &format!("INSERT INTO {table} (name, created_at) VALUES (?1, ?2)"),
                    rusqlite::params![name, now],
                )?;
                Ok(conn.last_insert_rowid())
            }
        }
    }
}

fn scalar_str<'a>(
    scalars: &'a std::collections::BTreeMap<String, serde_json::Value>,
    key: &str,
) -> Option<&'a str> {
    scalars.get(key).and_then(serde_json::Value::as_str)
}

/// Current related-id set for one relationship of an entry.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn association_ids(
    conn: &Connection,
    rel: Relationship,
    entry_id: i64,
) -> Result<BTreeSet<i64>> {
    let sql = format!(
        "SELECT {right} FROM {table} WHERE {left} = ?1",
        right = rel.right_column(),
        table = rel.table(),
        left = rel.left_column(),
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([entry_id], |row| row.get::<_, i64>(0))?;
    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .map_err(Error::from)
}

/// Add one association pair. Idempotent via `INSERT OR IGNORE`.
///
/// # Errors
///
/// Returns an error if the insert fails (e.g. the related row is missing).
pub fn add_association(conn: &Connection, rel: Relationship, left: i64, right: i64) -> Result<()> {
    let sql = format!(
        "INSERT OR IGNORE INTO {table} ({lcol}, {rcol}) VALUES (?1, ?2)",
        table = rel.table(),
        lcol = rel.left_column(),
        rcol = rel.right_column(),
    );
    conn.execute(&sql, [left, right])?;
    Ok(())
}

/// Remove one association pair. Returns true if a row was deleted.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn remove_association(
    conn: &Connection,
    rel: Relationship,
    left: i64,
    right: i64,
) -> Result<bool> {
    let sql = format!(
        "DELETE FROM {table} WHERE {lcol} = ?1 AND {rcol} = ?2",
        table = rel.table(),
        lcol = rel.left_column(),
        rcol = rel.right_column(),
    );
    Ok(conn.execute(&sql, [left, right])? > 0)
}

/// Soft-delete an entry inside a transaction. Already-deleted rows keep
/// their original deletion metadata.
pub fn soft_delete_entry(
    conn: &Connection,
    id: i64,
    actor: &str,
    reason: Option<&str>,
) -> Result<bool> {
    let exists: bool = conn
        .query_row("SELECT 1 FROM entries WHERE id = ?1", [id], |_| Ok(true))
        .optional()?
        .unwrap_or(false);
    if !exists {
        return Err(Error::EntryNotFound { id });
    }

    let now = chrono::Utc::now().timestamp_millis();
    let changed = conn.execute(
        "UPDATE entries SET deleted_at = ?1, deleted_by = ?2, deletion_reason = ?3
         WHERE id = ?4 AND deleted_at IS NULL",
        rusqlite::params![now, actor, reason, id],
    )?;
    Ok(changed > 0)
}

/// Restore a soft-deleted entry inside a transaction, clearing all three
/// deletion fields in one statement.
pub fn restore_entry(conn: &Connection, id: i64) -> Result<bool> {
    let exists: bool = conn
        .query_row("SELECT 1 FROM entries WHERE id = ?1", [id], |_| Ok(true))
        .optional()?
        .unwrap_or(false);
    if !exists {
        return Err(Error::EntryNotFound { id });
    }

    let changed = conn.execute(
        "UPDATE entries SET deleted_at = NULL, deleted_by = NULL, deletion_reason = NULL
         WHERE id = ?1 AND deleted_at IS NOT NULL",
        [id],
    )?;
    Ok(changed > 0)
}

/// Insert a named lookup row (tag/person/location) for tests and tooling.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_named(conn: &Connection, table: &str, name: &str) -> Result<i64> {
    let now = chrono::Utc::now().timestamp_millis();
    conn.execute(
        &format!("INSERT INTO {table} (name, created_at) VALUES (?1, ?2)"),
        rusqlite::params![name, now],
    )?;
    Ok(conn.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn entry_scalars(title: &str) -> BTreeMap<String, serde_json::Value> {
        let mut m = BTreeMap::new();
        m.insert("title".to_string(), serde_json::json!(title));
        m
    }

    #[test]
    fn test_upsert_entry_insert_then_update() {
        let storage = SqliteStorage::open_memory().unwrap();
        let conn = storage.conn();

        let id =
            upsert_entity_scalars(conn, EntityType::Entry, None, &entry_scalars("First"), None)
                .unwrap();
        assert!(id > 0);

        let mut scalars = entry_scalars("Renamed");
        scalars.insert("status".to_string(), serde_json::json!("final"));
        let same =
            upsert_entity_scalars(conn, EntityType::Entry, Some(id), &scalars, Some("a.yaml"))
                .unwrap();
        assert_eq!(same, id);

        let entry = get_entry(conn, id).unwrap().unwrap();
        assert_eq!(entry.title, "Renamed");
        assert_eq!(entry.status.as_deref(), Some("final"));
        // body absent from source clears the column
        assert!(entry.body.is_none());
    }

    #[test]
    fn test_upsert_entry_requires_title() {
        let storage = SqliteStorage::open_memory().unwrap();
        let err = upsert_entity_scalars(
            storage.conn(),
            EntityType::Entry,
            None,
            &BTreeMap::new(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::RequiredField(f) if f == "title"));
    }

    #[test]
    fn test_association_add_remove() {
        let storage = SqliteStorage::open_memory().unwrap();
        let conn = storage.conn();
        let entry =
            upsert_entity_scalars(conn, EntityType::Entry, None, &entry_scalars("E"), None)
                .unwrap();
        let tag = insert_named(conn, "tags", "reflection").unwrap();

        add_association(conn, Relationship::Tags, entry, tag).unwrap();
        // duplicate add is a no-op
        add_association(conn, Relationship::Tags, entry, tag).unwrap();
        assert_eq!(
            association_ids(conn, Relationship::Tags, entry).unwrap(),
            BTreeSet::from([tag])
        );

        assert!(remove_association(conn, Relationship::Tags, entry, tag).unwrap());
        assert!(!remove_association(conn, Relationship::Tags, entry, tag).unwrap());
    }

    #[test]
    fn test_soft_delete_round_trip() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let entry = upsert_entity_scalars(
            storage.conn(),
            EntityType::Entry,
            None,
            &entry_scalars("E"),
            None,
        )
        .unwrap();
        let tag = insert_named(storage.conn(), "tags", "growth").unwrap();
        add_association(storage.conn(), Relationship::Tags, entry, tag).unwrap();

        assert!(storage
            .soft_delete_entry(entry, "machine-a", Some("gone from source"))
            .unwrap());
        let deleted = storage.get_entry(entry).unwrap().unwrap();
        assert!(deleted.is_deleted());
        assert_eq!(deleted.deleted_by.as_deref(), Some("machine-a"));
        assert_eq!(deleted.deletion_reason.as_deref(), Some("gone from source"));
        // associations untouched
        assert_eq!(
            association_ids(storage.conn(), Relationship::Tags, entry)
                .unwrap()
                .len(),
            1
        );
        // excluded from default listing
        assert!(storage.list_entries(false, None).unwrap().is_empty());
        assert_eq!(storage.list_entries(true, None).unwrap().len(), 1);

        assert!(storage.restore_entry(entry, "machine-a").unwrap());
        let restored = storage.get_entry(entry).unwrap().unwrap();
        assert!(restored.deleted_at.is_none());
        assert!(restored.deleted_by.is_none());
        assert!(restored.deletion_reason.is_none());
        assert_eq!(
            association_ids(storage.conn(), Relationship::Tags, entry)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_double_delete_is_noop() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let entry = upsert_entity_scalars(
            storage.conn(),
            EntityType::Entry,
            None,
            &entry_scalars("E"),
            None,
        )
        .unwrap();

        assert!(storage.soft_delete_entry(entry, "a", None).unwrap());
        assert!(!storage.soft_delete_entry(entry, "b", None).unwrap());
        // original deletion metadata preserved
        let e = storage.get_entry(entry).unwrap().unwrap();
        assert_eq!(e.deleted_by.as_deref(), Some("a"));
    }

    #[test]
    fn test_mutate_rolls_back_on_error() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let result: Result<()> = storage.mutate("failing_op", "test", |tx, _ctx| {
            upsert_entity_scalars(tx, EntityType::Entry, None, &entry_scalars("Doomed"), None)?;
            Err(Error::Other("forced failure".to_string()))
        });
        assert!(result.is_err());
        assert!(storage.list_entries(true, None).unwrap().is_empty());
    }
}
