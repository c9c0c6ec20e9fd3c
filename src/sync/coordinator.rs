//! Synchronization coordinator.
//!
//! Invoked by ingestion pipelines after the transport (git) has delivered
//! source files. For each parsed entity the coordinator runs a six-step
//! reconciliation inside one IMMEDIATE transaction:
//!
//! 1. Fingerprint the parsed content.
//! 2. Check the fingerprint against the stored checkpoint; a divergence is
//!    logged and flagged but never blocks the write (last-write-wins).
//! 3. Reconcile associations: removals leave tombstones, additions are
//!    suppressed while a live tombstone covers the pair.
//! 4. Overwrite scalar fields from source.
//! 5. Record the checkpoint.
//! 6. Optionally soft-delete entries that vanished from the source.
//!
//! A failure anywhere in the sequence rolls the whole entity back and the
//! batch moves on; the entity's checkpoint stays at its last success so the
//! next run retries it fully.

use std::collections::BTreeSet;
use std::time::Instant;

use tracing::{debug, info, info_span, warn};

use crate::error::{Error, Result};
use crate::model::{EntityType, ParsedEntity, SyncSource};
use crate::storage::events::EventType;
use crate::storage::sqlite::{self, MutationContext, SqliteStorage};
use crate::sync::fingerprint::fingerprint;
use crate::sync::state::SyncStateStore;
use crate::sync::tombstone::{TombstoneStore, Ttl};
use crate::sync::types::{BatchReport, EntityOutcome, SuppressedAdd};

/// Orchestrates reconciliation between parsed source and the derived store.
///
/// Owns neither store: the storage handle is injected, and the tombstone and
/// sync-state stores are constructed over the per-entity transaction so all
/// six steps commit or roll back together.
pub struct Coordinator<'s> {
    storage: &'s mut SqliteStorage,
    sync_source: SyncSource,
    machine_id: String,
}

/// Summary of one entity's reconciliation.
#[derive(Debug, Clone)]
pub struct ReconcileSummary {
    pub entity_id: i64,
    pub conflict: bool,
    pub added: usize,
    pub removed: usize,
    pub tombstones_created: usize,
    pub suppressed: Vec<SuppressedAdd>,
}

impl<'s> Coordinator<'s> {
    /// Create a coordinator for one ingestion pass.
    #[must_use]
    pub fn new(storage: &'s mut SqliteStorage, sync_source: SyncSource, machine_id: &str) -> Self {
        Self {
            storage,
            sync_source,
            machine_id: machine_id.to_string(),
        }
    }

    /// Run a whole batch with per-entity failure isolation.
    ///
    /// Validation rejects and storage failures are captured as outcomes in
    /// the report; they never abort the remaining entities. With
    /// `prune_missing`, entries previously checkpointed from this source
    /// but absent from the batch are soft-deleted afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error only if the prune-missing scan itself fails.
    pub fn sync_batch(
        &mut self,
        entities: &[ParsedEntity],
        prune_missing: bool,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        let mut present: BTreeSet<i64> = BTreeSet::new();

        for parsed in entities {
            match self.sync_entity(parsed) {
                Ok(detail) => {
                    if parsed.entity_type == EntityType::Entry {
                        present.insert(detail.entity_id);
                    }
                    report.tombstones_created += detail.tombstones_created;
                    report
                        .suppressed_adds
                        .extend(detail.suppressed.iter().cloned());
                    report.push(EntityOutcome::Synced {
                        entity_type: parsed.entity_type.as_str().to_string(),
                        entity_id: detail.entity_id,
                        conflict: detail.conflict,
                        associations_added: detail.added,
                        associations_removed: detail.removed,
                        suppressed: detail.suppressed.len(),
                    });
                }
                Err(err) => {
                    // The record was in the batch, so the source still
                    // contains the entity; a failed entity must be left at
                    // its last state for retry, never pruned.
                    if parsed.entity_type == EntityType::Entry {
                        if let Some(id) = parsed.entity_id {
                            present.insert(id);
                        }
                    }
                    warn!(
                        entity_type = %parsed.entity_type,
                        entity_id = ?parsed.entity_id,
                        source_path = parsed.source_path.as_deref().unwrap_or("<none>"),
                        error = %err,
                        "entity reconciliation failed; batch continues"
                    );
                    let outcome = if err.exit_code() == 4 {
                        EntityOutcome::Invalid {
                            detail: err.to_string(),
                        }
                    } else {
                        EntityOutcome::Failed {
                            entity_type: parsed.entity_type.as_str().to_string(),
                            entity_id: parsed.entity_id,
                            detail: err.to_string(),
                        }
                    };
                    report.push(outcome);
                }
            }
        }

        if prune_missing {
            for id in self.soft_delete_missing(&present)? {
                report.push(EntityOutcome::SoftDeleted {
                    entity_type: EntityType::Entry.as_str().to_string(),
                    entity_id: id,
                });
            }
        }

        Ok(report)
    }

    /// Reconcile one parsed entity inside one transaction.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any mutation for malformed input,
    /// or a storage error (fully rolled back) if a write fails.
    pub fn sync_entity(&mut self, parsed: &ParsedEntity) -> Result<ReconcileSummary> {
        let span = info_span!(
            "sync_entity",
            entity_type = %parsed.entity_type,
            entity_id = ?parsed.entity_id,
            source = %self.sync_source,
        );
        let _guard = span.enter();
        let started = Instant::now();

        // Reject malformed input before opening the transaction.
        validate(parsed)?;

        let sync_source = self.sync_source;
        let machine_id = self.machine_id.clone();

        let summary = self.storage.mutate("sync_entity", &machine_id, |tx, ctx| {
            reconcile(tx, ctx, parsed, sync_source, &machine_id)
        })?;

        debug!(
            entity_id = summary.entity_id,
            conflict = summary.conflict,
            added = summary.added,
            removed = summary.removed,
            suppressed = summary.suppressed.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "entity reconciled"
        );

        Ok(summary)
    }

    /// Soft-delete entries previously checkpointed from this source but
    /// absent from the current pass.
    ///
    /// Their associations stay intact and no tombstones are created for
    /// their own links, so an explicit restore brings them back whole.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint scan or a delete fails.
    pub fn soft_delete_missing(&mut self, present: &BTreeSet<i64>) -> Result<Vec<i64>> {
        let known: Vec<i64> = {
            let store = SyncStateStore::new(self.storage.conn());
            store
                .checkpointed_ids(EntityType::Entry, self.sync_source)?
                .into_keys()
                .filter(|id| !present.contains(id))
                .collect()
        };

        let mut deleted = Vec::new();
        let reason = format!("absent from {} source", self.sync_source);
        let machine_id = self.machine_id.clone();

        for id in known {
            let was_live = self.storage.mutate("sync_prune_missing", &machine_id, |tx, ctx| {
                let actor = ctx.actor.clone();
                match sqlite::soft_delete_entry(tx, id, &actor, Some(&reason)) {
                    Ok(changed) => {
                        if changed {
                            ctx.record_event_with_comment(
                                "entry",
                                &id.to_string(),
                                EventType::EntitySoftDeleted,
                                &reason,
                            );
                        }
                        Ok(changed)
                    }
                    // checkpoint outlived the row; nothing to prune
                    Err(Error::EntryNotFound { .. }) => Ok(false),
                    Err(e) => Err(e),
                }
            })?;

            if was_live {
                info!(entry_id = id, source = %self.sync_source, "entry soft-deleted (missing from source)");
                deleted.push(id);
            }
        }

        Ok(deleted)
    }
}

/// Reject malformed parsed entities before any mutation.
fn validate(parsed: &ParsedEntity) -> Result<()> {
    match parsed.entity_type {
        EntityType::Entry => {
            if !parsed
                .scalar_fields
                .get("title")
                .is_some_and(serde_json::Value::is_string)
            {
                return Err(Error::RequiredField("title".to_string()));
            }
        }
        EntityType::Person | EntityType::Location | EntityType::Tag => {
            if !parsed
                .scalar_fields
                .get("name")
                .is_some_and(serde_json::Value::is_string)
            {
                return Err(Error::RequiredField("name".to_string()));
            }
        }
    }

    for name in parsed.associations.keys() {
        parsed.entity_type.relationship(name)?;
    }

    Ok(())
}

/// Fingerprint input: parsed content only, never local row ids.
///
/// Row ids are per-store; hashing them would make identical source content
/// fingerprint differently on two machines.
#[derive(serde::Serialize)]
struct FingerprintContent<'a> {
    scalar_fields: &'a std::collections::BTreeMap<String, serde_json::Value>,
    associations: &'a std::collections::BTreeMap<String, BTreeSet<i64>>,
}

fn content_fingerprint(parsed: &ParsedEntity) -> String {
    fingerprint(&FingerprintContent {
        scalar_fields: &parsed.scalar_fields,
        associations: &parsed.associations,
    })
}

/// The six-step sequence, run inside one transaction.
fn reconcile(
    tx: &rusqlite::Transaction<'_>,
    ctx: &mut MutationContext,
    parsed: &ParsedEntity,
    sync_source: SyncSource,
    machine_id: &str,
) -> Result<ReconcileSummary> {
    let tombstones = TombstoneStore::new(tx);
    let states = SyncStateStore::new(tx);

    // Step 1: fingerprint the freshly parsed content.
    let hash = content_fingerprint(parsed);

    // Step 2: conflict check. The write proceeds regardless; the checkpoint
    // carries the flag for later review.
    let conflict = match parsed.entity_id {
        Some(id) => states.check_conflict(parsed.entity_type, id, sync_source, &hash)?,
        None => false,
    };
    if conflict {
        let id = parsed.entity_id.unwrap_or_default();
        warn!(
            entity_type = %parsed.entity_type,
            entity_id = id,
            source = %sync_source,
            "fingerprint diverged from last checkpoint; applying last-write-wins"
        );
        ctx.record_event(
            parsed.entity_type.as_str(),
            &id.to_string(),
            EventType::ConflictDetected,
        );
    }

    // Step 4 (ordered before 3 so a new entity has a row id to attach
    // associations to; both run in the same transaction): overwrite scalar
    // fields from source.
    let is_new = parsed.entity_id.is_none();
    let entity_id = sqlite::upsert_entity_scalars(
        tx,
        parsed.entity_type,
        parsed.entity_id,
        &parsed.scalar_fields,
        parsed.source_path.as_deref(),
    )?;
    ctx.record_event(
        parsed.entity_type.as_str(),
        &entity_id.to_string(),
        if is_new {
            EventType::EntityCreated
        } else {
            EventType::EntityUpdated
        },
    );

    // Step 3: association reconciliation. Only relationships the source
    // actually lists are reconciled; an omitted relationship is untouched.
    let mut added = 0usize;
    let mut removed = 0usize;
    let mut tombstones_created = 0usize;
    let mut suppressed = Vec::new();

    for (name, desired) in &parsed.associations {
        let rel = parsed.entity_type.relationship(name)?;
        let current = sqlite::association_ids(tx, rel, entity_id)?;

        // In current, not desired: remove and tombstone.
        for &right in current.difference(desired) {
            sqlite::remove_association(tx, rel, entity_id, right)?;
            tombstones.create(
                rel.table(),
                entity_id,
                right,
                machine_id,
                sync_source.as_str(),
                Some("absent from freshly parsed source"),
                Ttl::Default,
            )?;
            ctx.record_event_with_comment(
                parsed.entity_type.as_str(),
                &entity_id.to_string(),
                EventType::AssociationRemoved,
                &format!("{} -> {right}", rel.table()),
            );
            ctx.record_event(
                "tombstone",
                &format!("{}:{entity_id}:{right}", rel.table()),
                EventType::TombstoneCreated,
            );
            removed += 1;
            tombstones_created += 1;
        }

        // In desired, not current: suppress if tombstoned, else add.
        for &right in desired.difference(&current) {
            if tombstones.exists(rel.table(), entity_id, right)? {
                let removed_by = tombstones
                    .get(rel.table(), entity_id, right)?
                    .map(|t| t.removed_by)
                    .unwrap_or_default();
                info!(
                    table = rel.table(),
                    left_id = entity_id,
                    right_id = right,
                    removed_by = %removed_by,
                    "re-add suppressed by live tombstone"
                );
                ctx.record_event(
                    "tombstone",
                    &format!("{}:{entity_id}:{right}", rel.table()),
                    EventType::AssociationSuppressed,
                );
                suppressed.push(SuppressedAdd {
                    table_name: rel.table().to_string(),
                    left_id: entity_id,
                    right_id: right,
                    removed_by,
                });
            } else {
                sqlite::add_association(tx, rel, entity_id, right)?;
                ctx.record_event_with_comment(
                    parsed.entity_type.as_str(),
                    &entity_id.to_string(),
                    EventType::AssociationAdded,
                    &format!("{} -> {right}", rel.table()),
                );
                added += 1;
            }
        }
        // Present in both: untouched.
    }

    // Step 5: checkpoint commit, conflict flag sticky.
    states.record(
        parsed.entity_type,
        entity_id,
        sync_source,
        &hash,
        machine_id,
        conflict,
    )?;
    ctx.record_event(
        parsed.entity_type.as_str(),
        &entity_id.to_string(),
        EventType::SyncRecorded,
    );

    Ok(ReconcileSummary {
        entity_id,
        conflict,
        added,
        removed,
        tombstones_created,
        suppressed,
    })
}
