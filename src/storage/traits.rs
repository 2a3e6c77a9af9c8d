//! Storage traits and error types
//!
//! This module defines the trait interface for checkpoint stores and
//! associated error types.

use crate::storage::{CheckpointRecord, RunRecord, RunStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Corrupt checkpoint for query '{query_id}': {reason}")]
    CorruptCheckpoint { query_id: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for checkpoint store implementations
///
/// Every query task holds the same store, so implementations take `&self`
/// and serialize writes internally. Saving a checkpoint overwrites the
/// previous record for that query in place.
pub trait CheckpointStore: Send + Sync {
    // ===== Run Management =====

    /// Creates a new harvest run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&self, config_hash: &str) -> StorageResult<i64>;

    /// Records the final status and finish time of a run
    fn finish_run(&self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    // ===== Checkpoints =====

    /// Inserts or overwrites the checkpoint of `record.query_id`
    fn save_checkpoint(&self, record: &CheckpointRecord) -> StorageResult<()>;

    /// Loads the checkpoint of one query
    fn load_checkpoint(&self, query_id: &str) -> StorageResult<Option<CheckpointRecord>>;

    /// Loads every checkpoint, ordered by query id
    fn list_checkpoints(&self) -> StorageResult<Vec<CheckpointRecord>>;

    /// Deletes every checkpoint, returning how many were removed
    fn clear_checkpoints(&self) -> StorageResult<usize>;
}
