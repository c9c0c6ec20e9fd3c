//! Lifelog: a local-first journal store synchronized through version control.
//!
//! Source files (YAML journals, wiki pages) travel between machines via git;
//! this crate maintains the derived SQLite store on each machine and keeps
//! the derived stores convergent. The hard part is not copying data, it is
//! deletions: a removal made on one machine must not be resurrected by
//! another machine syncing from a stale copy of the source. Tombstones
//! record deliberate removals, fingerprint checkpoints detect divergence
//! between syncs, and entries are soft-deleted so nothing is lost without
//! recourse.
//!
//! Storage handles are created explicitly and passed down; the library has
//! no ambient globals.

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod storage;
pub mod sync;

pub use error::{Error, ErrorCode, Result};
