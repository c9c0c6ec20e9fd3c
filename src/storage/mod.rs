//! Storage layer: SQLite schema, audit events, and the storage backend.

pub mod events;
pub mod schema;
pub mod sqlite;

pub use sqlite::{MutationContext, SqliteStorage};
