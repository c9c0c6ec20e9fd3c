//! CLI definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// Lifelog CLI - journal store synchronized through version control
#[derive(Parser, Debug)]
#[command(name = "llog", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.lifelog/data/lifelog.db)
    #[arg(long, global = true, env = "LLOG_DB")]
    pub db: Option<PathBuf>,

    /// Machine identifier for sync attribution
    #[arg(long, global = true, env = "LLOG_MACHINE")]
    pub machine: Option<String>,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the Lifelog database
    Init {
        /// Overwrite existing database
        #[arg(long)]
        force: bool,
    },

    /// Print version information
    Version,

    /// Synchronize parsed source files into the derived store
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },

    /// Conflict review and resolution
    Conflicts {
        #[command(subcommand)]
        command: ConflictCommands,
    },

    /// Tombstone administration
    Tombstone {
        #[command(subcommand)]
        command: TombstoneCommands,
    },

    /// Entry management (soft delete, restore, listing)
    Entry {
        #[command(subcommand)]
        command: EntryCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

// ============================================================================
// Sync Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum SyncCommands {
    /// Apply a batch of parsed entities (JSONL, one per line)
    Apply {
        /// Input file (reads stdin if omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Sync source the batch was parsed from (yaml, wiki)
        #[arg(short, long, default_value = "yaml")]
        source: String,

        /// Soft-delete entries previously synced from this source but
        /// absent from the batch
        #[arg(long)]
        prune_missing: bool,
    },

    /// Show checkpoint status
    Status {
        /// Limit status to one entity type (entry, person, location, tag)
        #[arg(short = 't', long)]
        entity_type: Option<String>,

        /// Limit status to one entity id
        #[arg(long)]
        id: Option<i64>,
    },
}

// ============================================================================
// Conflict Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum ConflictCommands {
    /// List unresolved conflicts
    List,

    /// Mark an entity's conflicts as resolved
    Resolve {
        /// Entity type (entry, person, location, tag)
        entity_type: String,

        /// Entity id
        id: i64,
    },
}

// ============================================================================
// Tombstone Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum TombstoneCommands {
    /// List tombstones, newest first
    List {
        /// Filter by association table (entry_tags, entry_people, entry_locations)
        #[arg(long)]
        table: Option<String>,

        /// Maximum tombstones to return
        #[arg(short, long, default_value = "100")]
        limit: u32,
    },

    /// Remove a tombstone, permitting re-addition on next sync
    Remove {
        /// Association table
        table: String,

        /// Owning entry id
        left_id: i64,

        /// Related id
        right_id: i64,
    },

    /// Delete expired tombstones
    Cleanup {
        /// Count what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Show tombstone statistics
    Stats,
}

// ============================================================================
// Entry Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum EntryCommands {
    /// List entries, newest first
    List {
        /// Include soft-deleted entries
        #[arg(long)]
        deleted: bool,

        /// Maximum entries to return
        #[arg(short, long, default_value = "100")]
        limit: u32,
    },

    /// Show one entry
    Show {
        /// Entry id
        id: i64,
    },

    /// Soft-delete an entry (associations are kept for restore)
    Delete {
        /// Entry id
        id: i64,

        /// Reason recorded with the deletion
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Restore a soft-deleted entry
    Restore {
        /// Entry id
        id: i64,
    },
}
