//! Tombstone store: an append-only log of deliberately severed associations.
//!
//! When a sync pass removes an association because the freshly parsed source
//! no longer lists it, a tombstone records the removal. A later sync on
//! another machine, working from a stale copy of the source, consults the
//! store before re-adding, so a deletion made on one machine cannot be
//! silently resurrected by another.
//!
//! The store is the sole writer of the `tombstones` table; only the
//! coordinator (and explicit CLI administration) calls its mutation methods.

use crate::error::{Error, Result};
use rusqlite::{Connection, OptionalExtension};

/// Default tombstone lifetime in days.
pub const DEFAULT_TTL_DAYS: i64 = 90;

/// Tombstone lifetime at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Expire after [`DEFAULT_TTL_DAYS`].
    Default,
    /// Never expire (`expires_at` NULL).
    Permanent,
    /// Expire after the given number of days.
    Days(i64),
}

impl Ttl {
    fn expires_at(self, now_ms: i64) -> Option<i64> {
        const DAY_MS: i64 = 24 * 60 * 60 * 1000;
        match self {
            Self::Default => Some(now_ms + DEFAULT_TTL_DAYS * DAY_MS),
            Self::Permanent => None,
            Self::Days(days) => Some(now_ms + days * DAY_MS),
        }
    }
}

/// A persisted association removal.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Tombstone {
    pub id: i64,
    pub table_name: String,
    pub left_id: i64,
    pub right_id: i64,
    pub removed_at: i64,
    pub removed_by: String,
    pub sync_source: String,
    pub reason: Option<String>,
    /// NULL means permanent.
    pub expires_at: Option<i64>,
}

/// Aggregate counts for reporting.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TombstoneStats {
    pub total: usize,
    pub permanent: usize,
    pub expired: usize,
    /// (table_name, live count), descending.
    pub by_table: Vec<(String, usize)>,
}

/// Store over the `tombstones` table.
///
/// Borrows a connection so it can run inside the coordinator's transaction
/// (a `Transaction` derefs to `Connection`) or standalone from the CLI.
pub struct TombstoneStore<'c> {
    conn: &'c Connection,
}

impl<'c> TombstoneStore<'c> {
    /// Create a store over an existing connection.
    #[must_use]
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Create (or refresh) a tombstone for an association pair.
    ///
    /// Upsert semantics: a second create for the same
    /// (table, left, right) triple refreshes `removed_at`, `removed_by`,
    /// `sync_source`, `reason`, and `expires_at` on the existing row instead
    /// of duplicating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        table_name: &str,
        left_id: i64,
        right_id: i64,
        removed_by: &str,
        sync_source: &str,
        reason: Option<&str>,
        ttl: Ttl,
    ) -> Result<Tombstone> {
        let now = chrono::Utc::now().timestamp_millis();
        let expires_at = ttl.expires_at(now);

        self.conn.execute(
            "INSERT INTO tombstones (table_name, left_id, right_id, removed_at, removed_by, sync_source, reason, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(table_name, left_id, right_id) DO UPDATE SET
                removed_at = excluded.removed_at,
                removed_by = excluded.removed_by,
                sync_source = excluded.sync_source,
                reason = excluded.reason,
                expires_at = excluded.expires_at",
            rusqlite::params![
                table_name, left_id, right_id, now, removed_by, sync_source, reason, expires_at
            ],
        )?;

        self.get(table_name, left_id, right_id)?
            .ok_or_else(|| Error::Other("tombstone vanished after upsert".to_string()))
    }

    /// Fetch one tombstone by its triple, expired or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, table_name: &str, left_id: i64, right_id: i64) -> Result<Option<Tombstone>> {
        self.conn
            .query_row(
                "SELECT id, table_name, left_id, right_id, removed_at, removed_by, sync_source, reason, expires_at
                 FROM tombstones WHERE table_name = ?1 AND left_id = ?2 AND right_id = ?3",
                rusqlite::params![table_name, left_id, right_id],
                tombstone_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    /// Whether a live (non-expired) tombstone covers the pair.
    ///
    /// Consulted by the coordinator before re-inserting an association.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn exists(&self, table_name: &str, left_id: i64, right_id: i64) -> Result<bool> {
        self.exists_at(
            table_name,
            left_id,
            right_id,
            chrono::Utc::now().timestamp_millis(),
        )
    }

    /// [`Self::exists`] evaluated at an explicit instant.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn exists_at(
        &self,
        table_name: &str,
        left_id: i64,
        right_id: i64,
        now_ms: i64,
    ) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM tombstones
                 WHERE table_name = ?1 AND left_id = ?2 AND right_id = ?3
                   AND (expires_at IS NULL OR expires_at > ?4)",
                rusqlite::params![table_name, left_id, right_id, now_ms],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Explicitly delete a tombstone, permitting re-addition on next sync.
    ///
    /// Never triggered implicitly. Returns true if a row was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn remove(&self, table_name: &str, left_id: i64, right_id: i64) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM tombstones WHERE table_name = ?1 AND left_id = ?2 AND right_id = ?3",
            rusqlite::params![table_name, left_id, right_id],
        )?;
        Ok(removed > 0)
    }

    /// List tombstones, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list(
        &self,
        filter_by_table: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Tombstone>> {
        let limit = limit.unwrap_or(100);
        let mut out = Vec::new();
        match filter_by_table {
            Some(table) => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, table_name, left_id, right_id, removed_at, removed_by, sync_source, reason, expires_at
                     FROM tombstones WHERE table_name = ?1
                     ORDER BY removed_at DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(rusqlite::params![table, limit], tombstone_from_row)?;
                for row in rows {
                    out.push(row?);
                }
            }
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, table_name, left_id, right_id, removed_at, removed_by, sync_source, reason, expires_at
                     FROM tombstones ORDER BY removed_at DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map([limit], tombstone_from_row)?;
                for row in rows {
                    out.push(row?);
                }
            }
        }
        Ok(out)
    }

    /// Delete expired tombstones (non-NULL `expires_at` at or before `now_ms`).
    ///
    /// Idempotent; permanent tombstones are never touched. Returns the
    /// number of rows deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn cleanup(&self, now_ms: i64) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM tombstones WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            [now_ms],
        )?;
        Ok(deleted)
    }

    /// Count what [`Self::cleanup`] would delete, without deleting.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn cleanup_dry_run(&self, now_ms: i64) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tombstones WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            [now_ms],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Aggregate counts for reporting.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn stats(&self) -> Result<TombstoneStats> {
        let now = chrono::Utc::now().timestamp_millis();
        let total: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tombstones", [], |row| row.get(0))?;
        let permanent: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tombstones WHERE expires_at IS NULL",
            [],
            |row| row.get(0),
        )?;
        let expired: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tombstones WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            [now],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn.prepare(
            "SELECT table_name, COUNT(*) FROM tombstones
             WHERE expires_at IS NULL OR expires_at > ?1
             GROUP BY table_name ORDER BY COUNT(*) DESC",
        )?;
        let rows = stmt.query_map([now], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut by_table = Vec::new();
        for row in rows {
            let (table, count) = row?;
            by_table.push((table, usize::try_from(count).unwrap_or(0)));
        }

        Ok(TombstoneStats {
            total: usize::try_from(total).unwrap_or(0),
            permanent: usize::try_from(permanent).unwrap_or(0),
            expired: usize::try_from(expired).unwrap_or(0),
            by_table,
        })
    }
}

fn tombstone_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tombstone> {
    Ok(Tombstone {
        id: row.get(0)?,
        table_name: row.get(1)?,
        left_id: row.get(2)?,
        right_id: row.get(3)?,
        removed_at: row.get(4)?,
        removed_by: row.get(5)?,
        sync_source: row.get(6)?,
        reason: row.get(7)?,
        expires_at: row.get(8)?,
    })
}
