//! Statistics generation from the checkpoint store
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics from the storage layer.

use crate::state::HarvestStatus;
use crate::storage::{CheckpointStore, RunRecord};
use crate::HarvestError;
use std::collections::HashMap;

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    /// Number of queries with a stored checkpoint
    pub total_queries: u64,

    /// Results across all queries
    pub total_results: u64,

    /// Result pages fetched across all queries
    pub total_pages: u64,

    /// Count of queries by status
    pub queries_by_status: HashMap<HarvestStatus, u64>,

    /// Queries that did not finish normally, with their status
    pub unfinished: Vec<(String, HarvestStatus)>,

    /// The most recent run, if any
    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `store` - The checkpoint store to query
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to read the store
pub fn load_statistics(store: &dyn CheckpointStore) -> Result<HarvestStatistics, HarvestError> {
    let checkpoints = store.list_checkpoints()?;

    let mut queries_by_status = HashMap::new();
    let mut unfinished = Vec::new();
    let mut total_results = 0;
    let mut total_pages = 0;

    for checkpoint in &checkpoints {
        *queries_by_status.entry(checkpoint.status).or_insert(0) += 1;
        total_results += checkpoint.entries.len() as u64;
        total_pages += checkpoint.pages_fetched as u64;

        if checkpoint.status != HarvestStatus::Completed {
            unfinished.push((checkpoint.query_id.clone(), checkpoint.status));
        }
    }

    Ok(HarvestStatistics {
        total_queries: checkpoints.len() as u64,
        total_results,
        total_pages,
        queries_by_status,
        unfinished,
        latest_run: store.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    if let Some(run) = &stats.latest_run {
        println!("Latest run:");
        println!("  Run ID: {}", run.id);
        println!("  Started: {}", run.started_at);
        if let Some(finished) = &run.finished_at {
            println!("  Finished: {}", finished);
        }
        println!("  Status: {}", run.status.to_db_string());
        println!();
    }

    println!("Overview:");
    println!("  Queries: {}", stats.total_queries);
    println!("  Pages fetched: {}", stats.total_pages);
    println!("  Results: {}", stats.total_results);
    println!();

    println!("Queries by Status:");
    for status in HarvestStatus::all_statuses() {
        let count = stats.queries_by_status.get(&status).copied().unwrap_or(0);
        if count == 0 {
            continue;
        }
        let percentage = if stats.total_queries > 0 {
            (count as f64 / stats.total_queries as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!();

    if !stats.unfinished.is_empty() {
        println!("Unfinished Queries ({}):", stats.unfinished.len());
        for (query_id, status) in &stats.unfinished {
            println!("  - {} ({})", query_id, status);
        }
        println!();
    }
}
