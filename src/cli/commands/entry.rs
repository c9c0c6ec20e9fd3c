//! Entry management: listing, soft delete, restore.
//!
//! Deletion here is always soft: the row keeps its deletion triple
//! (`deleted_at`, `deleted_by`, `deletion_reason`) and its associations, so
//! `restore` brings the entry back whole.

use crate::cli::EntryCommands;
use crate::config::resolve_machine_id;
use crate::error::{Error, Result};
use crate::model::Entry;
use colored::Colorize;
use std::path::PathBuf;

/// Execute entry commands.
pub fn execute(
    command: &EntryCommands,
    db_path: Option<&PathBuf>,
    machine: Option<&str>,
    json: bool,
) -> Result<()> {
    match command {
        EntryCommands::List { deleted, limit } => list(*deleted, *limit, db_path, json),
        EntryCommands::Show { id } => show(*id, db_path, json),
        EntryCommands::Delete { id, reason } => {
            delete(*id, reason.as_deref(), db_path, machine, json)
        }
        EntryCommands::Restore { id } => restore(*id, db_path, machine, json),
    }
}

fn print_entry_line(entry: &Entry) {
    let marker = if entry.is_deleted() {
        format!(" {}", "[deleted]".red())
    } else {
        String::new()
    };
    println!(
        "  {} {}{marker} (updated {})",
        entry.id,
        entry.title,
        super::format_ts(entry.updated_at)
    );
}

fn list(deleted: bool, limit: u32, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let (storage, _path) = super::open_storage(db_path)?;
    let entries = storage.list_entries(deleted, Some(limit))?;

    if json {
        println!("{}", serde_json::to_string(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No entries.");
        return Ok(());
    }
    println!("{} entries:", entries.len());
    for entry in &entries {
        print_entry_line(entry);
    }
    Ok(())
}

fn show(id: i64, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let (storage, _path) = super::open_storage(db_path)?;
    let entry = storage.get_entry(id)?.ok_or(Error::EntryNotFound { id })?;

    if json {
        println!("{}", serde_json::to_string(&entry)?);
        return Ok(());
    }

    println!("Entry {}: {}", entry.id, entry.title);
    if let Some(status) = &entry.status {
        println!("  Status:  {status}");
    }
    if let Some(source) = &entry.source_path {
        println!("  Source:  {source}");
    }
    println!("  Created: {}", super::format_ts(entry.created_at));
    println!("  Updated: {}", super::format_ts(entry.updated_at));
    if let Some(deleted_at) = entry.deleted_at {
        println!(
            "  {} {} by {}",
            "Deleted:".red(),
            super::format_ts(deleted_at),
            entry.deleted_by.as_deref().unwrap_or("unknown")
        );
        if let Some(reason) = &entry.deletion_reason {
            println!("    reason: {reason}");
        }
        println!("  Restore with 'llog entry restore {}'.", entry.id);
    }
    if let Some(body) = &entry.body {
        println!();
        println!("{body}");
    }
    Ok(())
}

fn delete(
    id: i64,
    reason: Option<&str>,
    db_path: Option<&PathBuf>,
    machine: Option<&str>,
    json: bool,
) -> Result<()> {
    let (mut storage, path) = super::open_storage(db_path)?;
    let machine_id = resolve_machine_id(machine, &path)?;
    let deleted = storage.soft_delete_entry(id, &machine_id, reason)?;

    if json {
        let output = serde_json::json!({
            "entity_id": id,
            "deleted": deleted,
            "deleted_by": machine_id,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else if deleted {
        println!("Soft-deleted entry {id}. Restore with 'llog entry restore {id}'.");
    } else {
        println!("Entry {id} is already deleted.");
    }
    Ok(())
}

fn restore(id: i64, db_path: Option<&PathBuf>, machine: Option<&str>, json: bool) -> Result<()> {
    let (mut storage, path) = super::open_storage(db_path)?;
    let machine_id = resolve_machine_id(machine, &path)?;
    let restored = storage.restore_entry(id, &machine_id)?;

    if json {
        let output = serde_json::json!({
            "entity_id": id,
            "restored": restored,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else if restored {
        println!("Restored entry {id}.");
    } else {
        println!("Entry {id} is not deleted.");
    }
    Ok(())
}
