//! Audit event storage and retrieval.
//!
//! Events track mutations in the derived store for debugging and history.
//! Sync checkpoints carry their own audit trail in `sync_state`; events add
//! actor attribution for the mutations around them (entity writes, soft
//! deletes, tombstone administration).

use rusqlite::{Connection, Result};

/// Event types for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    // Entity events
    EntityCreated,
    EntityUpdated,
    EntitySoftDeleted,
    EntityRestored,

    // Association events
    AssociationAdded,
    AssociationRemoved,
    AssociationSuppressed,

    // Tombstone events
    TombstoneCreated,
    TombstoneRemoved,
    TombstoneExpired,

    // Sync events
    SyncRecorded,
    ConflictDetected,
    ConflictResolved,
}

impl EventType {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EntityCreated => "entity_created",
            Self::EntityUpdated => "entity_updated",
            Self::EntitySoftDeleted => "entity_soft_deleted",
            Self::EntityRestored => "entity_restored",
            Self::AssociationAdded => "association_added",
            Self::AssociationRemoved => "association_removed",
            Self::AssociationSuppressed => "association_suppressed",
            Self::TombstoneCreated => "tombstone_created",
            Self::TombstoneRemoved => "tombstone_removed",
            Self::TombstoneExpired => "tombstone_expired",
            Self::SyncRecorded => "sync_recorded",
            Self::ConflictDetected => "conflict_detected",
            Self::ConflictResolved => "conflict_resolved",
        }
    }
}

/// An audit event record.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub event_type: EventType,
    pub actor: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub comment: Option<String>,
    pub created_at: i64,
}

impl Event {
    /// Create a new event (id will be assigned by database).
    #[must_use]
    pub fn new(entity_type: &str, entity_id: &str, event_type: EventType, actor: &str) -> Self {
        Self {
            id: 0,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            event_type,
            actor: actor.to_string(),
            old_value: None,
            new_value: None,
            comment: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Add old/new values for field change tracking.
    #[must_use]
    pub fn with_values(mut self, old: Option<String>, new: Option<String>) -> Self {
        self.old_value = old;
        self.new_value = new;
        self
    }

    /// Add a comment to the event.
    #[must_use]
    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }
}

/// Insert an event into the database.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_event(conn: &Connection, event: &Event) -> Result<i64> {
    conn.execute(
        "INSERT INTO events (entity_type, entity_id, event_type, actor, old_value, new_value, comment, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            event.entity_type,
            event.entity_id,
            event.event_type.as_str(),
            event.actor,
            event.old_value,
            event.new_value,
            event.comment,
            event.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Get events for an entity, newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_events(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
    limit: Option<u32>,
) -> Result<Vec<Event>> {
    let limit = limit.unwrap_or(100);
    let mut stmt = conn.prepare(
        "SELECT id, entity_type, entity_id, event_type, actor, old_value, new_value, comment, created_at
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY created_at DESC
         LIMIT ?3",
    )?;

    let rows = stmt.query_map(rusqlite::params![entity_type, entity_id, limit], |row| {
        Ok(Event {
            id: row.get(0)?,
            entity_type: row.get(1)?,
            entity_id: row.get(2)?,
            event_type: parse_event_type(row.get::<_, String>(3)?.as_str()),
            actor: row.get(4)?,
            old_value: row.get(5)?,
            new_value: row.get(6)?,
            comment: row.get(7)?,
            created_at: row.get(8)?,
        })
    })?;

    rows.collect()
}

fn parse_event_type(s: &str) -> EventType {
    match s {
        "entity_created" => EventType::EntityCreated,
        "entity_soft_deleted" => EventType::EntitySoftDeleted,
        "entity_restored" => EventType::EntityRestored,
        "association_added" => EventType::AssociationAdded,
        "association_removed" => EventType::AssociationRemoved,
        "association_suppressed" => EventType::AssociationSuppressed,
        "tombstone_created" => EventType::TombstoneCreated,
        "tombstone_removed" => EventType::TombstoneRemoved,
        "tombstone_expired" => EventType::TombstoneExpired,
        "sync_recorded" => EventType::SyncRecorded,
        "conflict_detected" => EventType::ConflictDetected,
        "conflict_resolved" => EventType::ConflictResolved,
        _ => EventType::EntityUpdated, // Fallback
    }
}
