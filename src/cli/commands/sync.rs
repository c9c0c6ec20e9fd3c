//! Sync command implementations.
//!
//! `llog sync apply` is the handoff point from ingestion pipelines: the
//! pipeline parses git-transported source files into JSONL (one
//! `ParsedEntity` per line) and pipes it here. The coordinator reconciles
//! each entity and the command prints an end-of-run summary covering
//! conflicts and suppressed re-adds, which are outcomes to review, not
//! errors.

use crate::cli::SyncCommands;
use crate::config::resolve_machine_id;
use crate::error::{Error, Result};
use crate::model::{EntityType, ParsedEntity, SyncSource};
use crate::sync::{BatchReport, Coordinator, SyncStateStore, SyncStatus, TombstoneStore};
use colored::Colorize;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::str::FromStr;

/// Execute sync commands.
pub fn execute(
    command: &SyncCommands,
    db_path: Option<&PathBuf>,
    machine: Option<&str>,
    json: bool,
) -> Result<()> {
    match command {
        SyncCommands::Apply {
            input,
            source,
            prune_missing,
        } => apply(input.as_ref(), source, *prune_missing, db_path, machine, json),
        SyncCommands::Status { entity_type, id } => {
            status(entity_type.as_deref(), *id, db_path, json)
        }
    }
}

/// Parse a JSONL batch: one `ParsedEntity` per non-empty line.
fn read_batch<R: Read>(reader: R) -> Result<Vec<ParsedEntity>> {
    let mut entities = Vec::new();
    for (lineno, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed: ParsedEntity = serde_json::from_str(&line).map_err(|e| {
            Error::Sync(format!("line {}: invalid record: {e}", lineno + 1))
        })?;
        entities.push(parsed);
    }
    Ok(entities)
}

fn apply(
    input: Option<&PathBuf>,
    source: &str,
    prune_missing: bool,
    db_path: Option<&PathBuf>,
    machine: Option<&str>,
    json: bool,
) -> Result<()> {
    let sync_source = SyncSource::from_str(source)?;
    let (mut storage, path) = super::open_storage(db_path)?;
    let machine_id = resolve_machine_id(machine, &path)?;

    let entities = match input {
        Some(file) => read_batch(std::fs::File::open(file)?)?,
        None => read_batch(std::io::stdin().lock())?,
    };

    let mut coordinator = Coordinator::new(&mut storage, sync_source, &machine_id);
    let report = coordinator.sync_batch(&entities, prune_missing)?;

    if json {
        let output = serde_json::json!({
            "source": sync_source.as_str(),
            "machine_id": machine_id,
            "report": report,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        print_report(&report, sync_source);
    }

    // Partial failure is an error exit even though processed entities stay
    // committed.
    if report.failed > 0 {
        return Err(Error::Sync(format!(
            "{} of {} entities failed; rerun to retry them",
            report.failed,
            report.total()
        )));
    }

    Ok(())
}

fn print_report(report: &BatchReport, source: SyncSource) {
    if report.total() == 0 {
        println!("Nothing to sync from {source}.");
        return;
    }

    println!("Sync complete from {source}: {} entities", report.total());
    println!();
    println!("  Synced:       {}", report.synced);
    if report.soft_deleted > 0 {
        println!("  Soft-deleted: {}", report.soft_deleted);
    }
    if report.invalid > 0 {
        println!("  {}      {}", "Invalid:".yellow(), report.invalid);
    }
    if report.failed > 0 {
        println!("  {}       {}", "Failed:".red(), report.failed);
    }
    if report.tombstones_created > 0 {
        println!("  Tombstones:   {}", report.tombstones_created);
    }

    if report.conflicts > 0 {
        println!();
        println!(
            "{} {} conflict(s) detected; last write won. Review with 'llog conflicts list'.",
            "!".yellow().bold(),
            report.conflicts
        );
    }

    if !report.suppressed_adds.is_empty() {
        println!();
        println!(
            "{} {} re-add(s) suppressed by tombstones:",
            "!".yellow().bold(),
            report.suppressed_adds.len()
        );
        for s in &report.suppressed_adds {
            println!(
                "    {} ({}, {}) removed by {}",
                s.table_name, s.left_id, s.right_id, s.removed_by
            );
        }
        println!("  Use 'llog tombstone remove <table> <left> <right>' to allow a re-add.");
    }
}

fn status(
    entity_type: Option<&str>,
    id: Option<i64>,
    db_path: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let (storage, _path) = super::open_storage(db_path)?;
    let states = SyncStateStore::new(storage.conn());

    // With a type and id: per-checkpoint detail for that entity.
    if let (Some(ty), Some(id)) = (entity_type, id) {
        let entity_type = EntityType::from_str(ty)?;
        let checkpoints = states.get(entity_type, id, None)?;
        let deleted = entity_type == EntityType::Entry
            && storage.get_entry(id)?.is_some_and(|e| e.is_deleted());

        if json {
            let output = serde_json::json!({
                "entity_type": entity_type.as_str(),
                "entity_id": id,
                "deleted": deleted,
                "checkpoints": checkpoints,
            });
            println!("{}", serde_json::to_string(&output)?);
            return Ok(());
        }

        if checkpoints.is_empty() {
            println!("{} {id}: {}", entity_type, SyncStatus::Unsynced);
            return Ok(());
        }
        for state in &checkpoints {
            let status = SyncStatus::derive(Some(state), deleted);
            let status = match status {
                SyncStatus::Conflicted => status.to_string().yellow().to_string(),
                SyncStatus::Deleted => status.to_string().red().to_string(),
                _ => status.to_string(),
            };
            println!(
                "{} {id} [{}]: {status}, synced {} by {}",
                entity_type,
                state.sync_source,
                super::format_ts(state.synced_at),
                state.machine_id
            );
        }
        return Ok(());
    }

    // Otherwise: aggregate view.
    let stats = states.stats()?;
    let tombstones = TombstoneStore::new(storage.conn()).stats()?;

    if json {
        let output = serde_json::json!({
            "checkpoints": stats,
            "tombstones": tombstones,
        });
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("Checkpoints: {}", stats.total);
    for (ty, count) in &stats.by_type {
        println!("  {ty}: {count}");
    }
    for (source, count) in &stats.by_source {
        println!("  from {source}: {count}");
    }
    if stats.unresolved_conflicts > 0 {
        println!(
            "  {} {}",
            "unresolved conflicts:".yellow(),
            stats.unresolved_conflicts
        );
    }
    println!();
    println!(
        "Tombstones: {} ({} permanent, {} expired)",
        tombstones.total, tombstones.permanent, tombstones.expired
    );

    Ok(())
}
