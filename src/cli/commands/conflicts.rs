//! Conflict review and resolution.
//!
//! Conflicts are never resolved by the sync path itself; the flag stays on
//! the checkpoint until someone reviews the entity and clears it here.

use crate::cli::ConflictCommands;
use crate::config::resolve_machine_id;
use crate::error::Result;
use crate::model::EntityType;
use crate::storage::events::EventType;
use crate::sync::SyncStateStore;
use colored::Colorize;
use std::path::PathBuf;
use std::str::FromStr;

/// Execute conflict commands.
pub fn execute(
    command: &ConflictCommands,
    db_path: Option<&PathBuf>,
    machine: Option<&str>,
    json: bool,
) -> Result<()> {
    match command {
        ConflictCommands::List => list(db_path, json),
        ConflictCommands::Resolve { entity_type, id } => {
            resolve(entity_type, *id, db_path, machine, json)
        }
    }
}

fn list(db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let (storage, _path) = super::open_storage(db_path)?;
    let conflicts = SyncStateStore::new(storage.conn()).list_conflicts()?;

    if json {
        println!("{}", serde_json::to_string(&conflicts)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No unresolved conflicts.");
        return Ok(());
    }

    println!("{} unresolved conflict(s):", conflicts.len());
    println!();
    for c in &conflicts {
        println!(
            "  {} {} {} [{}] last synced {} by {}",
            "!".yellow().bold(),
            c.entity_type,
            c.entity_id,
            c.sync_source,
            super::format_ts(c.synced_at),
            c.machine_id
        );
    }
    println!();
    println!("Resolve with 'llog conflicts resolve <type> <id>' after reviewing the entity.");
    Ok(())
}

fn resolve(
    entity_type: &str,
    id: i64,
    db_path: Option<&PathBuf>,
    machine: Option<&str>,
    json: bool,
) -> Result<()> {
    let entity_type = EntityType::from_str(entity_type)?;
    let (mut storage, path) = super::open_storage(db_path)?;
    let machine_id = resolve_machine_id(machine, &path)?;
    let cleared = storage.mutate("conflict_resolve", &machine_id, |tx, ctx| {
        let cleared = SyncStateStore::new(tx).resolve(entity_type, id)?;
        if cleared > 0 {
            ctx.record_event_with_comment(
                entity_type.as_str(),
                &id.to_string(),
                EventType::ConflictResolved,
                &format!("cleared {cleared} checkpoint(s)"),
            );
        }
        Ok(cleared)
    })?;

    if json {
        let output = serde_json::json!({
            "entity_type": entity_type.as_str(),
            "entity_id": id,
            "cleared": cleared,
        });
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if cleared == 0 {
        println!("No unresolved conflicts for {entity_type} {id}.");
    } else {
        println!("Resolved {cleared} conflict(s) for {entity_type} {id}.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SyncSource;
    use crate::storage::events::get_events;
    use crate::storage::SqliteStorage;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_writes_audit_event() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("lifelog.db");
        {
            let storage = SqliteStorage::open(&db).unwrap();
            SyncStateStore::new(storage.conn())
                .record(EntityType::Entry, 7, SyncSource::Yaml, "abc", "laptop", true)
                .unwrap();
        }

        resolve("entry", 7, Some(&db), Some("laptop"), true).unwrap();

        let storage = SqliteStorage::open(&db).unwrap();
        assert!(SyncStateStore::new(storage.conn())
            .list_conflicts()
            .unwrap()
            .is_empty());
        let events = get_events(storage.conn(), "entry", "7", None).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::ConflictResolved);
        assert_eq!(events[0].actor, "laptop");
    }

    #[test]
    fn test_resolve_without_conflict_records_nothing() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("lifelog.db");
        {
            SqliteStorage::open(&db).unwrap();
        }

        resolve("entry", 7, Some(&db), Some("laptop"), true).unwrap();

        let storage = SqliteStorage::open(&db).unwrap();
        assert!(get_events(storage.conn(), "entry", "7", None)
            .unwrap()
            .is_empty());
    }
}
