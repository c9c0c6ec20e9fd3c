//! Tombstone administration.
//!
//! Tombstones expire on their own after the TTL; `cleanup` exists for
//! explicit housekeeping and `remove` for deliberately allowing a pair to
//! be re-added before its tombstone expires.

use crate::cli::TombstoneCommands;
use crate::config::resolve_machine_id;
use crate::error::{Error, Result};
use crate::storage::events::EventType;
use crate::sync::TombstoneStore;
use std::path::PathBuf;

/// Execute tombstone commands.
pub fn execute(
    command: &TombstoneCommands,
    db_path: Option<&PathBuf>,
    machine: Option<&str>,
    json: bool,
) -> Result<()> {
    match command {
        TombstoneCommands::List { table, limit } => list(table.as_deref(), *limit, db_path, json),
        TombstoneCommands::Remove {
            table,
            left_id,
            right_id,
        } => remove(table, *left_id, *right_id, db_path, machine, json),
        TombstoneCommands::Cleanup { dry_run } => cleanup(*dry_run, db_path, machine, json),
        TombstoneCommands::Stats => stats(db_path, json),
    }
}

fn list(table: Option<&str>, limit: u32, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let (storage, _path) = super::open_storage(db_path)?;
    let tombstones = TombstoneStore::new(storage.conn()).list(table, Some(limit))?;

    if json {
        println!("{}", serde_json::to_string(&tombstones)?);
        return Ok(());
    }

    if tombstones.is_empty() {
        println!("No tombstones.");
        return Ok(());
    }

    println!("{} tombstone(s):", tombstones.len());
    for t in &tombstones {
        let expiry = t
            .expires_at
            .map_or_else(|| "permanent".to_string(), |e| {
                format!("expires {}", super::format_ts(e))
            });
        println!(
            "  {} ({}, {}) removed {} by {} via {} ({expiry})",
            t.table_name,
            t.left_id,
            t.right_id,
            super::format_ts(t.removed_at),
            t.removed_by,
            t.sync_source
        );
        if let Some(reason) = &t.reason {
            println!("    reason: {reason}");
        }
    }
    Ok(())
}

fn remove(
    table: &str,
    left_id: i64,
    right_id: i64,
    db_path: Option<&PathBuf>,
    machine: Option<&str>,
    json: bool,
) -> Result<()> {
    let (mut storage, path) = super::open_storage(db_path)?;
    let machine_id = resolve_machine_id(machine, &path)?;
    let removed = storage.mutate("tombstone_remove", &machine_id, |tx, ctx| {
        let removed = TombstoneStore::new(tx).remove(table, left_id, right_id)?;
        if removed {
            ctx.record_event(
                "tombstone",
                &format!("{table}:{left_id}:{right_id}"),
                EventType::TombstoneRemoved,
            );
        }
        Ok(removed)
    })?;

    if !removed {
        return Err(Error::TombstoneNotFound {
            table: table.to_string(),
            left: left_id,
            right: right_id,
        });
    }

    if json {
        let output = serde_json::json!({
            "table_name": table,
            "left_id": left_id,
            "right_id": right_id,
            "removed": true,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Removed tombstone {table} ({left_id}, {right_id}).");
        println!("The next sync may re-add this association.");
    }
    Ok(())
}

fn cleanup(
    dry_run: bool,
    db_path: Option<&PathBuf>,
    machine: Option<&str>,
    json: bool,
) -> Result<()> {
    let (mut storage, path) = super::open_storage(db_path)?;
    let now = chrono::Utc::now().timestamp_millis();

    let count = if dry_run {
        TombstoneStore::new(storage.conn()).cleanup_dry_run(now)?
    } else {
        let machine_id = resolve_machine_id(machine, &path)?;
        storage.mutate("tombstone_cleanup", &machine_id, |tx, ctx| {
            let deleted = TombstoneStore::new(tx).cleanup(now)?;
            if deleted > 0 {
                ctx.record_event_with_comment(
                    "tombstone",
                    "cleanup",
                    EventType::TombstoneExpired,
                    &format!("deleted {deleted} expired tombstone(s)"),
                );
            }
            Ok(deleted)
        })?
    };

    if json {
        let output = serde_json::json!({
            "expired": count,
            "dry_run": dry_run,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else if dry_run {
        println!("{count} expired tombstone(s) would be deleted.");
    } else {
        println!("Deleted {count} expired tombstone(s).");
    }
    Ok(())
}

fn stats(db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let (storage, _path) = super::open_storage(db_path)?;
    let stats = TombstoneStore::new(storage.conn()).stats()?;

    if json {
        println!("{}", serde_json::to_string(&stats)?);
        return Ok(());
    }

    println!("Tombstones: {}", stats.total);
    println!("  Permanent: {}", stats.permanent);
    println!("  Expired:   {}", stats.expired);
    if !stats.by_table.is_empty() {
        println!("  Live by table:");
        for (table, count) in &stats.by_table {
            println!("    {table}: {count}");
        }
    }
    Ok(())
}
