//! Sync reporting types.
//!
//! The coordinator summarizes each ingestion pass in a [`BatchReport`]: per
//! entity outcomes, suppressed re-adds, and conflicts. The CLI renders the
//! report as the end-of-run summary; nothing here is an error, since failures are
//! captured per entity so the batch can keep going.

use serde::Serialize;

use crate::sync::state::SyncState;

/// Derived lifecycle state of one (entity, sync source) pair.
///
/// Transitions: `Unsynced → Synced` on first success; `Synced → Conflicted`
/// when a divergent fingerprint is detected; `Conflicted → Synced` only via
/// explicit resolve; any state → `Deleted` via soft-delete; `Deleted →
/// Synced` via restore. There is no automatic `Conflicted → Synced`
/// transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// No checkpoint recorded yet.
    Unsynced,
    /// Checkpoint present, no unresolved conflict.
    Synced,
    /// Checkpoint present with the sticky conflict flag set.
    Conflicted,
    /// The entity is soft-deleted.
    Deleted,
}

impl SyncStatus {
    /// Derive the status from a checkpoint row and the entity's
    /// soft-delete marker.
    #[must_use]
    pub fn derive(state: Option<&SyncState>, entity_deleted: bool) -> Self {
        if entity_deleted {
            return Self::Deleted;
        }
        match state {
            None => Self::Unsynced,
            Some(s) if s.conflict_detected => Self::Conflicted,
            Some(_) => Self::Synced,
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unsynced => "unsynced",
            Self::Synced => "synced",
            Self::Conflicted => "conflicted",
            Self::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// A re-add the coordinator refused because a live tombstone covers the
/// pair. A policy outcome, not an error.
#[derive(Debug, Clone, Serialize)]
pub struct SuppressedAdd {
    pub table_name: String,
    pub left_id: i64,
    pub right_id: i64,
    /// Machine that originally removed the association.
    pub removed_by: String,
}

/// What happened to one entity during a batch.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EntityOutcome {
    /// Reconciled and checkpointed.
    Synced {
        entity_type: String,
        entity_id: i64,
        conflict: bool,
        associations_added: usize,
        associations_removed: usize,
        suppressed: usize,
    },
    /// Soft-deleted because the source no longer contains it.
    SoftDeleted { entity_type: String, entity_id: i64 },
    /// Rejected before any mutation (missing key, unknown type).
    Invalid { detail: String },
    /// Storage failure mid-reconciliation; rolled back, retried next run.
    Failed {
        entity_type: String,
        entity_id: Option<i64>,
        detail: String,
    },
}

/// Summary of one ingestion pass through the coordinator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// Entities reconciled and checkpointed.
    pub synced: usize,
    /// Entities soft-deleted via the prune-missing path.
    pub soft_deleted: usize,
    /// Entities rejected by validation before any mutation.
    pub invalid: usize,
    /// Entities whose reconciliation failed and rolled back.
    pub failed: usize,
    /// Checkpoints recorded with the conflict flag set this pass.
    pub conflicts: usize,
    /// Tombstones created for removed associations this pass.
    pub tombstones_created: usize,
    /// Re-adds suppressed by live tombstones this pass.
    pub suppressed_adds: Vec<SuppressedAdd>,
    /// Per-entity detail, in processing order.
    pub outcomes: Vec<EntityOutcome>,
}

impl BatchReport {
    /// Total entities processed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.synced + self.soft_deleted + self.invalid + self.failed
    }

    /// Whether anything in this pass needs human review.
    #[must_use]
    pub fn needs_review(&self) -> bool {
        self.conflicts > 0 || !self.suppressed_adds.is_empty() || self.failed > 0
    }

    pub(crate) fn push(&mut self, outcome: EntityOutcome) {
        match &outcome {
            EntityOutcome::Synced { conflict, .. } => {
                self.synced += 1;
                if *conflict {
                    self.conflicts += 1;
                }
            }
            EntityOutcome::SoftDeleted { .. } => self.soft_deleted += 1,
            EntityOutcome::Invalid { .. } => self.invalid += 1,
            EntityOutcome::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }
}
