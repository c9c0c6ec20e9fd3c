//! Multi-pass sync scenarios over the library API.
//!
//! Each machine keeps its own derived store; the passes below replay the
//! sequences a machine sees as git delivers fresh and stale versions of the
//! source files.

use std::collections::{BTreeMap, BTreeSet};

use lifelog::model::{EntityType, ParsedEntity, Relationship, SyncSource};
use lifelog::storage::SqliteStorage;
use lifelog::sync::{Coordinator, SyncStateStore, TombstoneStore};

fn entry(id: Option<i64>, title: &str, tags: &[i64]) -> ParsedEntity {
    let mut scalar_fields = BTreeMap::new();
    scalar_fields.insert("title".to_string(), serde_json::json!(title));
    let mut associations = BTreeMap::new();
    associations.insert("tags".to_string(), tags.iter().copied().collect());
    ParsedEntity {
        entity_type: EntityType::Entry,
        entity_id: id,
        scalar_fields,
        associations,
        source_path: Some("journal/2026-08-26.yaml".to_string()),
    }
}

fn tag(conn: &rusqlite::Connection, name: &str) -> i64 {
    lifelog::storage::sqlite::insert_named(conn, "tags", name).unwrap()
}

#[test]
fn deletion_survives_stale_readd() {
    let mut storage = SqliteStorage::open_memory().unwrap();
    let reflection = tag(storage.conn(), "reflection");
    let growth = tag(storage.conn(), "growth");

    // Pass 1: fresh source lists both tags.
    let id = {
        let mut coord = Coordinator::new(&mut storage, SyncSource::Yaml, "laptop");
        coord
            .sync_entity(&entry(None, "Day one", &[reflection, growth]))
            .unwrap()
            .entity_id
    };

    // Pass 2: a newer source version dropped "growth".
    {
        let mut coord = Coordinator::new(&mut storage, SyncSource::Yaml, "laptop");
        let summary = coord
            .sync_entity(&entry(Some(id), "Day one", &[reflection]))
            .unwrap();
        assert_eq!(summary.removed, 1);
        assert_eq!(summary.tombstones_created, 1);
    }

    // Pass 3: git delivers a stale file that still lists "growth".
    {
        let mut coord = Coordinator::new(&mut storage, SyncSource::Yaml, "laptop");
        let summary = coord
            .sync_entity(&entry(Some(id), "Day one", &[reflection, growth]))
            .unwrap();
        assert_eq!(summary.added, 0);
        assert_eq!(summary.suppressed.len(), 1);
    }

    let current =
        lifelog::storage::sqlite::association_ids(storage.conn(), Relationship::Tags, id).unwrap();
    assert_eq!(current, BTreeSet::from([reflection]));

    // An explicit tombstone removal lets the pair come back.
    TombstoneStore::new(storage.conn())
        .remove("entry_tags", id, growth)
        .unwrap();
    let mut coord = Coordinator::new(&mut storage, SyncSource::Yaml, "laptop");
    let summary = coord
        .sync_entity(&entry(Some(id), "Day one", &[reflection, growth]))
        .unwrap();
    assert_eq!(summary.added, 1);
}

#[test]
fn divergence_flags_conflict_until_resolved() {
    let mut storage = SqliteStorage::open_memory().unwrap();

    let id = {
        let mut coord = Coordinator::new(&mut storage, SyncSource::Yaml, "laptop");
        coord
            .sync_entity(&entry(None, "Draft", &[]))
            .unwrap()
            .entity_id
    };

    // Content changed between syncs (a merge brought another machine's edit).
    {
        let mut coord = Coordinator::new(&mut storage, SyncSource::Yaml, "laptop");
        let summary = coord
            .sync_entity(&entry(Some(id), "Draft, merged", &[]))
            .unwrap();
        assert!(summary.conflict);
    }

    // Last write won, and the flag is visible until resolved.
    assert_eq!(
        storage.get_entry(id).unwrap().unwrap().title,
        "Draft, merged"
    );
    {
        let states = SyncStateStore::new(storage.conn());
        assert_eq!(states.list_conflicts().unwrap().len(), 1);
        states.resolve(EntityType::Entry, id).unwrap();
        assert!(states.list_conflicts().unwrap().is_empty());
    }

    // A clean pass after resolution does not re-flag.
    let mut coord = Coordinator::new(&mut storage, SyncSource::Yaml, "laptop");
    let summary = coord
        .sync_entity(&entry(Some(id), "Draft, merged", &[]))
        .unwrap();
    assert!(!summary.conflict);
}

#[test]
fn prune_missing_then_restore_round_trip() {
    let mut storage = SqliteStorage::open_memory().unwrap();
    let reflection = tag(storage.conn(), "reflection");

    let (kept, pruned) = {
        let mut coord = Coordinator::new(&mut storage, SyncSource::Yaml, "laptop");
        let kept = coord
            .sync_entity(&entry(None, "Kept", &[]))
            .unwrap()
            .entity_id;
        let pruned = coord
            .sync_entity(&entry(None, "Gone", &[reflection]))
            .unwrap()
            .entity_id;
        (kept, pruned)
    };

    // Next pass: the second entry's file was deleted from the source tree.
    let report = {
        let mut coord = Coordinator::new(&mut storage, SyncSource::Yaml, "laptop");
        coord
            .sync_batch(&[entry(Some(kept), "Kept", &[])], true)
            .unwrap()
    };
    assert_eq!(report.soft_deleted, 1);

    let deleted = storage.get_entry(pruned).unwrap().unwrap();
    assert!(deleted.is_deleted());
    // associations kept, no tombstones for the entity's own links
    assert_eq!(
        lifelog::storage::sqlite::association_ids(storage.conn(), Relationship::Tags, pruned)
            .unwrap()
            .len(),
        1
    );
    assert!(TombstoneStore::new(storage.conn())
        .list(None, None)
        .unwrap()
        .is_empty());

    // Restore brings the entry back whole.
    storage.restore_entry(pruned, "laptop").unwrap();
    let restored = storage.get_entry(pruned).unwrap().unwrap();
    assert!(!restored.is_deleted());
    assert!(restored.deletion_reason.is_none());
}

#[test]
fn prune_missing_spares_entry_whose_record_failed() {
    let mut storage = SqliteStorage::open_memory().unwrap();

    let id = {
        let mut coord = Coordinator::new(&mut storage, SyncSource::Yaml, "laptop");
        coord
            .sync_entity(&entry(None, "Kept", &[]))
            .unwrap()
            .entity_id
    };

    // Next pass: the entry is still in the source, but its record arrives
    // malformed. Rejection must not read as absence.
    let mut malformed = entry(Some(id), "ignored", &[]);
    malformed.scalar_fields.remove("title");
    let report = {
        let mut coord = Coordinator::new(&mut storage, SyncSource::Yaml, "laptop");
        coord.sync_batch(&[malformed], true).unwrap()
    };

    assert_eq!(report.invalid, 1);
    assert_eq!(report.soft_deleted, 0);
    assert!(!storage.get_entry(id).unwrap().unwrap().is_deleted());
}

#[test]
fn wiki_and_yaml_checkpoints_are_independent() {
    let mut storage = SqliteStorage::open_memory().unwrap();

    let id = {
        let mut coord = Coordinator::new(&mut storage, SyncSource::Yaml, "laptop");
        coord
            .sync_entity(&entry(None, "Shared", &[]))
            .unwrap()
            .entity_id
    };

    // First wiki sync with different content: no wiki checkpoint yet, so no
    // conflict regardless of what YAML recorded.
    {
        let mut coord = Coordinator::new(&mut storage, SyncSource::Wiki, "laptop");
        let summary = coord
            .sync_entity(&entry(Some(id), "Shared, wiki flavor", &[]))
            .unwrap();
        assert!(!summary.conflict);
    }

    let states = SyncStateStore::new(storage.conn());
    assert_eq!(states.get(EntityType::Entry, id, None).unwrap().len(), 2);
}
