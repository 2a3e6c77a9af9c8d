//! Storage module for persisting harvest progress
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Per-query checkpoints (ordered results, page cursor, status)
//! - Run tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteCheckpointStore;
pub use traits::{CheckpointStore, StorageError, StorageResult};

use crate::state::HarvestStatus;
use crate::HarvestError;
use serde::Serialize;
use std::path::Path;

/// Opens (or creates) the checkpoint database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteCheckpointStore)` - Successfully initialized store
/// * `Err(HarvestError)` - Failed to open the database
pub fn open_store(path: &Path) -> Result<SqliteCheckpointStore, HarvestError> {
    SqliteCheckpointStore::new(path)
}

/// A harvested result link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HarvestEntry {
    pub url: String,
    /// Link text or heading; empty when the page offered none
    pub title: String,
}

impl HarvestEntry {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }
}

/// Persisted progress of one query
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointRecord {
    pub query_id: String,
    /// Results in first-discovery order, no duplicates
    pub entries: Vec<HarvestEntry>,
    /// Next page to fetch, if any
    pub page_cursor: Option<String>,
    pub pages_fetched: u32,
    pub status: HarvestStatus,
    pub last_updated: String,
}

/// Represents a harvest run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
