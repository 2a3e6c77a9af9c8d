//! JSON export of harvested results

use crate::storage::CheckpointStore;
use crate::HarvestError;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// One exported result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    pub query: String,
    pub url: String,
    pub title: String,
}

/// Flattens every stored checkpoint into rows
///
/// Rows are grouped by query id and keep each query's discovery order.
pub fn collect_rows(store: &dyn CheckpointStore) -> Result<Vec<ExportRow>, HarvestError> {
    let rows = store
        .list_checkpoints()?
        .into_iter()
        .flat_map(|checkpoint| {
            let query = checkpoint.query_id;
            checkpoint.entries.into_iter().map(move |entry| ExportRow {
                query: query.clone(),
                url: entry.url,
                title: entry.title,
            })
        })
        .collect();

    Ok(rows)
}

/// Writes every stored result to `path` as a JSON array
///
/// # Returns
///
/// The number of rows written
pub fn export_results(store: &dyn CheckpointStore, path: &Path) -> Result<usize, HarvestError> {
    let rows = collect_rows(store)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, &rows)?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    tracing::info!("Exported {} results to {}", rows.len(), path.display());
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::HarvestStatus;
    use crate::storage::{CheckpointRecord, HarvestEntry, SqliteCheckpointStore};
    use tempfile::TempDir;

    fn save(store: &SqliteCheckpointStore, query_id: &str, entries: Vec<HarvestEntry>) {
        store
            .save_checkpoint(&CheckpointRecord {
                query_id: query_id.to_string(),
                entries,
                page_cursor: None,
                pages_fetched: 1,
                status: HarvestStatus::Completed,
                last_updated: "2026-01-01T00:00:00Z".to_string(),
            })
            .unwrap();
    }

    #[test]
    fn test_rows_grouped_by_query_in_order() {
        let store = SqliteCheckpointStore::new_in_memory().unwrap();
        save(
            &store,
            "b",
            vec![HarvestEntry::new("https://x.example.com/2", "Two")],
        );
        save(
            &store,
            "a",
            vec![
                HarvestEntry::new("https://x.example.com/9", "Nine"),
                HarvestEntry::new("https://x.example.com/1", "One"),
            ],
        );

        let rows = collect_rows(&store).unwrap();
        let urls: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| (r.query.as_str(), r.url.as_str()))
            .collect();
        assert_eq!(
            urls,
            vec![
                ("a", "https://x.example.com/9"),
                ("a", "https://x.example.com/1"),
                ("b", "https://x.example.com/2"),
            ]
        );
    }

    #[test]
    fn test_export_writes_json() {
        let store = SqliteCheckpointStore::new_in_memory().unwrap();
        save(
            &store,
            "q",
            vec![HarvestEntry::new("https://x.example.com/1", "Rust \"Dev\"")],
        );
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("results.json");

        let written = export_results(&store, &path).unwrap();
        assert_eq!(written, 1);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"query": "q", "url": "https://x.example.com/1", "title": "Rust \"Dev\""}
            ])
        );
    }

    #[test]
    fn test_export_empty_store() {
        let store = SqliteCheckpointStore::new_in_memory().unwrap();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");

        assert_eq!(export_results(&store, &path).unwrap(), 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "[]");
    }
}
