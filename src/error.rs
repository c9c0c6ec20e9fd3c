//! Error types for the Lifelog CLI.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, etc.)
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers
//!
//! Lookups that can legitimately find nothing return `Result<Option<T>>`
//! instead of an error, so "first sync, no prior checkpoint" is never
//! mistaken for a failure. Conflicts are not errors either: they are
//! recorded on the checkpoint and surfaced through reporting commands.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Lifelog operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the string; shells on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    AlreadyInitialized,
    DatabaseError,

    // Not Found (exit 3)
    EntryNotFound,
    TombstoneNotFound,

    // Validation (exit 4)
    InvalidEntityType,
    InvalidSyncSource,
    InvalidRelationship,
    RequiredField,
    InvalidArgument,

    // Sync (exit 6)
    SyncError,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::EntryNotFound => "ENTRY_NOT_FOUND",
            Self::TombstoneNotFound => "TOMBSTONE_NOT_FOUND",
            Self::InvalidEntityType => "INVALID_ENTITY_TYPE",
            Self::InvalidSyncSource => "INVALID_SYNC_SOURCE",
            Self::InvalidRelationship => "INVALID_RELATIONSHIP",
            Self::RequiredField => "REQUIRED_FIELD",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::SyncError => "SYNC_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::AlreadyInitialized | Self::DatabaseError => 2,
            Self::EntryNotFound | Self::TombstoneNotFound => 3,
            Self::InvalidEntityType
            | Self::InvalidSyncSource
            | Self::InvalidRelationship
            | Self::RequiredField
            | Self::InvalidArgument => 4,
            Self::SyncError => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether a caller should retry with corrected input.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidEntityType
                | Self::InvalidSyncSource
                | Self::InvalidRelationship
                | Self::RequiredField
                | Self::InvalidArgument
                | Self::DatabaseError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in Lifelog operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `llog init` first")]
    NotInitialized,

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("Entry not found: {id}")]
    EntryNotFound { id: i64 },

    #[error("No tombstone for ({table}, {left}, {right})")]
    TombstoneNotFound {
        table: String,
        left: i64,
        right: i64,
    },

    #[error("Unknown entity type: {0}")]
    InvalidEntityType(String),

    #[error("Unknown sync source: {0}")]
    InvalidSyncSource(String),

    #[error("Unknown relationship '{relationship}' for entity type '{entity_type}'")]
    InvalidRelationship {
        entity_type: String,
        relationship: String,
    },

    #[error("Missing required field: {0}")]
    RequiredField(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Sync error: {0}")]
    Sync(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::EntryNotFound { .. } => ErrorCode::EntryNotFound,
            Self::TombstoneNotFound { .. } => ErrorCode::TombstoneNotFound,
            Self::InvalidEntityType(_) => ErrorCode::InvalidEntityType,
            Self::InvalidSyncSource(_) => ErrorCode::InvalidSyncSource,
            Self::InvalidRelationship { .. } => ErrorCode::InvalidRelationship,
            Self::RequiredField(_) => ErrorCode::RequiredField,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Sync(_) => ErrorCode::SyncError,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint for humans and scripts.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => {
                Some("Run `llog init` to create the database".to_string())
            }

            Self::AlreadyInitialized { path } => Some(format!(
                "Database already exists at {}. Use `--force` to reinitialize.",
                path.display()
            )),

            Self::EntryNotFound { id } => Some(format!(
                "No entry with id {id}. Use `llog entry list` (add `--deleted` to include soft-deleted entries)."
            )),

            Self::TombstoneNotFound { table, .. } => Some(format!(
                "Use `llog tombstone list --table {table}` to see live tombstones."
            )),

            Self::InvalidEntityType(_) => {
                Some("Valid entity types: entry, person, location, tag".to_string())
            }

            Self::InvalidSyncSource(_) => Some("Valid sync sources: yaml, wiki".to_string()),

            Self::InvalidRelationship { entity_type, .. } => Some(format!(
                "Valid relationships for '{entity_type}': tags, people, locations"
            )),

            Self::RequiredField(field) => Some(format!(
                "Each parsed record needs '{field}'. Check the JSONL produced by your ingestion pipeline."
            )),

            Self::InvalidArgument(_)
            | Self::Sync(_)
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
