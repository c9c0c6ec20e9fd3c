//! Synchronization layer: fingerprints, tombstones, checkpoints, and the
//! coordinator that ties them together.

pub mod coordinator;
pub mod fingerprint;
pub mod state;
pub mod tombstone;
pub mod types;

pub use coordinator::{Coordinator, ReconcileSummary};
pub use fingerprint::{fingerprint, fingerprint_str, EMPTY_FINGERPRINT};
pub use state::{SyncState, SyncStateStats, SyncStateStore};
pub use tombstone::{Tombstone, TombstoneStats, TombstoneStore, Ttl, DEFAULT_TTL_DAYS};
pub use types::{BatchReport, EntityOutcome, SuppressedAdd, SyncStatus};
