//! SQLite checkpoint store
//!
//! This module provides a SQLite-based implementation of the CheckpointStore trait.

use crate::state::HarvestStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{CheckpointStore, StorageError, StorageResult};
use crate::storage::{CheckpointRecord, HarvestEntry, RunRecord, RunStatus};
use crate::HarvestError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite checkpoint store
///
/// One connection behind a mutex; every write is a single statement, so a
/// crash leaves either the previous or the new record.
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointStore {
    /// Creates a new SqliteCheckpointStore instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteCheckpointStore)` - Successfully opened/created database
    /// * `Err(HarvestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Raw checkpoint columns, decoded outside the rusqlite row callback
struct CheckpointRow {
    query_id: String,
    ordered_urls: String,
    titles: String,
    page_cursor: Option<String>,
    pages_fetched: u32,
    status: String,
    last_updated: String,
}

impl CheckpointRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            query_id: row.get(0)?,
            ordered_urls: row.get(1)?,
            titles: row.get(2)?,
            page_cursor: row.get(3)?,
            pages_fetched: row.get(4)?,
            status: row.get(5)?,
            last_updated: row.get(6)?,
        })
    }

    fn decode(self) -> StorageResult<CheckpointRecord> {
        let urls: Vec<String> = serde_json::from_str(&self.ordered_urls)?;
        let titles: Vec<String> = serde_json::from_str(&self.titles)?;

        if titles.len() != urls.len() {
            return Err(StorageError::CorruptCheckpoint {
                query_id: self.query_id,
                reason: format!("{} urls but {} titles", urls.len(), titles.len()),
            });
        }

        let status = HarvestStatus::from_db_string(&self.status).ok_or_else(|| {
            StorageError::CorruptCheckpoint {
                query_id: self.query_id.clone(),
                reason: format!("unknown status '{}'", self.status),
            }
        })?;

        let entries = urls
            .into_iter()
            .zip(titles)
            .map(|(url, title)| HarvestEntry { url, title })
            .collect();

        Ok(CheckpointRecord {
            query_id: self.query_id,
            entries,
            page_cursor: self.page_cursor,
            pages_fetched: self.pages_fetched,
            status,
            last_updated: self.last_updated,
        })
    }
}

const SELECT_CHECKPOINT: &str = "SELECT query_id, ordered_urls, titles, page_cursor, pages_fetched, status, last_updated FROM checkpoints";

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
    })
}

impl CheckpointStore for SqliteCheckpointStore {
    // ===== Run Management =====

    fn create_run(&self, config_hash: &str) -> StorageResult<i64> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn finish_run(&self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn().execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn()
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;

        Ok(run)
    }

    // ===== Checkpoints =====

    fn save_checkpoint(&self, record: &CheckpointRecord) -> StorageResult<()> {
        let urls: Vec<&str> = record.entries.iter().map(|e| e.url.as_str()).collect();
        let titles: Vec<&str> = record.entries.iter().map(|e| e.title.as_str()).collect();
        let ordered_urls = serde_json::to_string(&urls)?;
        let titles = serde_json::to_string(&titles)?;

        self.conn().execute(
            "INSERT INTO checkpoints (query_id, ordered_urls, titles, page_cursor, pages_fetched, status, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(query_id) DO UPDATE SET
                ordered_urls = excluded.ordered_urls,
                titles = excluded.titles,
                page_cursor = excluded.page_cursor,
                pages_fetched = excluded.pages_fetched,
                status = excluded.status,
                last_updated = excluded.last_updated",
            params![
                record.query_id,
                ordered_urls,
                titles,
                record.page_cursor,
                record.pages_fetched,
                record.status.to_db_string(),
                record.last_updated,
            ],
        )?;

        Ok(())
    }

    fn load_checkpoint(&self, query_id: &str) -> StorageResult<Option<CheckpointRecord>> {
        let row = self
            .conn()
            .query_row(
                &format!("{} WHERE query_id = ?1", SELECT_CHECKPOINT),
                params![query_id],
                CheckpointRow::from_row,
            )
            .optional()?;

        row.map(CheckpointRow::decode).transpose()
    }

    fn list_checkpoints(&self) -> StorageResult<Vec<CheckpointRecord>> {
        let rows = {
            let conn = self.conn();
            let mut stmt = conn.prepare(&format!("{} ORDER BY query_id", SELECT_CHECKPOINT))?;
            let rows = stmt
                .query_map([], CheckpointRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        rows.into_iter().map(CheckpointRow::decode).collect()
    }

    fn clear_checkpoints(&self) -> StorageResult<usize> {
        let removed = self.conn().execute("DELETE FROM checkpoints", [])?;
        Ok(removed)
    }
}
