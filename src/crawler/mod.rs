//! Crawler module for paginated harvests
//!
//! This module contains everything above a single page fetch, including:
//! - Result extraction and next-page location
//! - Per-query checkpoints and the CAPTCHA pause protocol
//! - Pagination through one query's result pages
//! - Overall harvest coordination

mod checkpointer;
mod coordinator;
mod extractor;
mod locator;
mod paginator;

pub use checkpointer::{CrawlCheckpoint, CrawlCheckpointer, PauseReport};
pub use coordinator::{HarvestSummary, Harvester};
pub use extractor::{
    extractor_for, Candidate, ContentExtractor, SearchResultExtractor, SelectorExtractor,
};
pub use locator::{NextPage, NextPageLocator};
pub use paginator::{CrawlReport, CrawlSettings, PaginationCrawler, StopReason};

use crate::config::Config;
use crate::storage::open_store;
use crate::Result;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs a complete harvest
///
/// This is the main entry point for a harvest. It will:
/// 1. Open the checkpoint store
/// 2. Clear stored checkpoints when `fresh` is set
/// 3. Attach to the browser, if one is configured
/// 4. Paginate through every query until it stops, fails, or is cancelled
///
/// # Arguments
///
/// * `config` - The harvest configuration
/// * `config_hash` - Hash of the configuration file, recorded with the run
/// * `fresh` - Whether to clear stored checkpoints first
/// * `cancel` - Cancelling this token stops every query
pub async fn harvest(
    config: Config,
    config_hash: String,
    fresh: bool,
    cancel: CancellationToken,
) -> Result<HarvestSummary> {
    let store = Arc::new(open_store(Path::new(&config.output.database_path))?);
    let harvester = Harvester::new(config, config_hash, store, cancel);

    if fresh {
        harvester.clear_checkpoints()?;
    }

    harvester.run().await
}
