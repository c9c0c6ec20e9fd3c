//! Data types for the derived journal store.
//!
//! Entity types, sync sources, and relationships are closed enums rather
//! than free-form strings, so a typo in an ingestion pipeline cannot create
//! orphaned checkpoint rows or tombstones against a table that does not
//! exist.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::Error;

/// Primary entity types in the derived store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A journal entry (the guarded, soft-deletable entity).
    Entry,
    /// A person referenced by entries.
    Person,
    /// A location referenced by entries.
    Location,
    /// A tag attached to entries.
    Tag,
}

impl EntityType {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Person => "person",
            Self::Location => "location",
            Self::Tag => "tag",
        }
    }

    /// Relationships this entity type owns (entity id is always `left_id`).
    #[must_use]
    pub const fn relationships(&self) -> &'static [Relationship] {
        match self {
            Self::Entry => &[
                Relationship::Tags,
                Relationship::People,
                Relationship::Locations,
            ],
            Self::Person | Self::Location | Self::Tag => &[],
        }
    }

    /// Look up a relationship by its parsed-source name.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRelationship` if this entity type does not own
    /// a relationship with that name.
    pub fn relationship(&self, name: &str) -> crate::error::Result<Relationship> {
        self.relationships()
            .iter()
            .find(|r| r.name() == name)
            .copied()
            .ok_or_else(|| Error::InvalidRelationship {
                entity_type: self.as_str().to_string(),
                relationship: name.to_string(),
            })
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entry" => Ok(Self::Entry),
            "person" => Ok(Self::Person),
            "location" => Ok(Self::Location),
            "tag" => Ok(Self::Tag),
            _ => Err(Error::InvalidEntityType(s.to_string())),
        }
    }
}

/// Ingestion tracks an entity's checkpoint can belong to.
///
/// YAML front-matter files and wiki pages are independent sources: the same
/// entry keeps one checkpoint per source, so a wiki edit never masks a
/// divergence on the YAML side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncSource {
    Yaml,
    Wiki,
}

impl SyncSource {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Wiki => "wiki",
        }
    }
}

impl std::fmt::Display for SyncSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yaml" => Ok(Self::Yaml),
            "wiki" => Ok(Self::Wiki),
            _ => Err(Error::InvalidSyncSource(s.to_string())),
        }
    }
}

/// Many-to-many relationships owned by entries.
///
/// Each variant pins an association table and its column order, which is
/// also the canonical (left, right) order for tombstones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relationship {
    Tags,
    People,
    Locations,
}

impl Relationship {
    /// The parsed-source name of this relationship.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Tags => "tags",
            Self::People => "people",
            Self::Locations => "locations",
        }
    }

    /// The association table backing this relationship.
    #[must_use]
    pub const fn table(&self) -> &'static str {
        match self {
            Self::Tags => "entry_tags",
            Self::People => "entry_people",
            Self::Locations => "entry_locations",
        }
    }

    /// Column holding the owning entry id (`left_id` in tombstones).
    #[must_use]
    pub const fn left_column(&self) -> &'static str {
        "entry_id"
    }

    /// Column holding the related id (`right_id` in tombstones).
    #[must_use]
    pub const fn right_column(&self) -> &'static str {
        match self {
            Self::Tags => "tag_id",
            Self::People => "person_id",
            Self::Locations => "location_id",
        }
    }
}

/// One entity as produced by an ingestion pipeline's parser.
///
/// The parser itself is out of scope; this is the handoff contract. Maps use
/// `BTreeMap`/`BTreeSet` so serialization is deterministic and fingerprints
/// agree across machines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedEntity {
    /// Which entity table this record belongs to.
    pub entity_type: EntityType,
    /// Existing row id; `None` means the entity is new to this store.
    #[serde(default)]
    pub entity_id: Option<i64>,
    /// Scalar columns parsed from source (title, body, status, ...).
    #[serde(default)]
    pub scalar_fields: BTreeMap<String, serde_json::Value>,
    /// Desired related-id sets per relationship name.
    #[serde(default)]
    pub associations: BTreeMap<String, BTreeSet<i64>>,
    /// Source file this record was parsed from, for log context.
    #[serde(default)]
    pub source_path: Option<String>,
}

/// A journal entry row from the derived store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: i64,
    pub title: String,
    pub body: Option<String>,
    pub status: Option<String>,
    pub source_path: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    /// Soft-delete marker; set by explicit delete, cleared by restore.
    pub deleted_at: Option<i64>,
    pub deleted_by: Option<String>,
    pub deletion_reason: Option<String>,
}

impl Entry {
    /// Whether this entry is currently soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
