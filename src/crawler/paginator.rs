//! Pagination through one query's result pages
//!
//! Each page goes through fetch → extract → dedup-append → persist → locate
//! next. Pagination stops on a page with no new results, on a page without a
//! next control, on the page limit, or when a fetch ends in `Exhausted` or
//! `Cancelled`. The query's final status is persisted in every case.

use crate::config::{EngineConfig, QueryEntry, TransportPreference};
use crate::crawler::checkpointer::CrawlCheckpointer;
use crate::crawler::extractor::{extractor_for, ContentExtractor};
use crate::crawler::locator::NextPageLocator;
use crate::fetch::{sleep_or_cancel, FetchEngine, FetchRequest};
use crate::state::HarvestStatus;
use crate::storage::{CheckpointStore, HarvestEntry};
use crate::{HarvestError, Result};
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Crawl-level pacing and limits
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Whether to wait a random `[min_delay, max_delay]` between pages
    pub delay_jitter: bool,
    /// 0 means no limit
    pub max_pages: u32,
    pub timeout: Duration,
    pub preference: TransportPreference,
}

impl CrawlSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            min_delay: Duration::from_secs_f64(config.min_delay),
            max_delay: Duration::from_secs_f64(config.max_delay),
            delay_jitter: config.enable_delay_jitter,
            max_pages: config.max_pages,
            timeout: config.timeout(),
            preference: config.transport_preference,
        }
    }

    /// A delay drawn from `[min_delay, max_delay]`, or zero when disabled
    pub fn inter_page_delay(&self) -> Duration {
        if !self.delay_jitter || self.max_delay.is_zero() {
            return Duration::ZERO;
        }

        let min = self.min_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64().max(min);
        Duration::from_secs_f64(rand::thread_rng().gen_range(min..=max))
    }
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Why pagination ended normally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A page added no new results
    EmptyPage,
    /// No unvisited next-page control was found
    NoNextPage,
    /// The configured page limit was reached
    PageLimit,
}

/// Summary of a completed query
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub query_id: String,
    pub pages: u32,
    pub entries: Vec<HarvestEntry>,
    pub stop: StopReason,
    /// CAPTCHA pauses the query went through
    pub pauses: usize,
}

pub struct PaginationCrawler {
    query_id: String,
    start_url: String,
    engine: Arc<FetchEngine>,
    extractor: Box<dyn ContentExtractor>,
    locator: NextPageLocator,
    checkpointer: CrawlCheckpointer,
    settings: CrawlSettings,
}

impl PaginationCrawler {
    /// Builds a crawler for `query` with the extractor and locator it asks for
    pub fn new(
        query: &QueryEntry,
        engine: Arc<FetchEngine>,
        store: Arc<dyn CheckpointStore>,
        settings: CrawlSettings,
    ) -> Result<Self> {
        Ok(Self {
            query_id: query.id.clone(),
            start_url: query.url.clone(),
            engine,
            extractor: extractor_for(query)?,
            locator: NextPageLocator::for_selectors(&query.next_selectors)?,
            checkpointer: CrawlCheckpointer::new(store, query.id.clone()),
            settings,
        })
    }

    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    pub fn engine(&self) -> &Arc<FetchEngine> {
        &self.engine
    }

    pub fn with_extractor(mut self, extractor: Box<dyn ContentExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Runs the query to completion
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - Pagination ended normally
    /// * `Err(HarvestError::Exhausted)` - A page could not be fetched
    /// * `Err(HarvestError::Cancelled)` - The harvest was cancelled
    pub async fn run(mut self) -> Result<CrawlReport> {
        tracing::info!("[{}] Starting at {}", self.query_id, self.start_url);

        let cancel = self.engine.cancellation_token().clone();
        let mut visited = HashSet::new();
        let mut next_url = Some(self.start_url.clone());

        self.checkpointer
            .checkpoint_mut()
            .set_page_cursor(next_url.clone());
        self.checkpointer.persist_with_status(HarvestStatus::Running)?;

        let stop = loop {
            let url = match next_url.take() {
                Some(url) => url,
                None => break StopReason::NoNextPage,
            };

            if !visited.is_empty() {
                let delay = self.settings.inter_page_delay();
                if !delay.is_zero() {
                    tracing::debug!(
                        "[{}] Waiting {:.1}s before the next page",
                        self.query_id,
                        delay.as_secs_f64()
                    );
                }
                let waited = sleep_or_cancel(delay, &cancel).await;
                if let Err(e) = waited {
                    return Err(self.fail(e));
                }
            }

            let page_url = Url::parse(&url)?;
            visited.insert(url.clone());

            let request = FetchRequest::new(url.as_str(), self.query_id.as_str())
                .with_preference(self.settings.preference)
                .with_timeout(self.settings.timeout);

            let fetched = self.engine.fetch(&request, &mut self.checkpointer).await;
            let result = match fetched {
                Ok(result) => result,
                Err(e) => return Err(self.fail(e)),
            };

            // Links resolve against where the page landed after redirects
            let page_url = match Url::parse(&result.url) {
                Ok(landed) if result.url != url => {
                    visited.insert(result.url.clone());
                    landed
                }
                _ => page_url,
            };

            let checkpoint = self.checkpointer.checkpoint_mut();
            checkpoint.record_page();
            let page = checkpoint.pages_fetched();

            let added = match self.extractor.extract(&result.body, &page_url) {
                Ok(candidates) => {
                    let found = candidates.len();
                    let added = checkpoint.extend(candidates);
                    tracing::info!(
                        "[{}] Page {}: {} results, {} new ({} total)",
                        self.query_id,
                        page,
                        found,
                        added,
                        checkpoint.len()
                    );
                    Some(added)
                }
                Err(e) => {
                    tracing::warn!(
                        "[{}] Could not extract results from page {} ({}): {}",
                        self.query_id,
                        page,
                        url,
                        e
                    );
                    None
                }
            };

            let located = self.locator.locate(&result.body, &page_url, &visited);

            let stop = if added == Some(0) {
                Some(StopReason::EmptyPage)
            } else if located.is_none() {
                Some(StopReason::NoNextPage)
            } else if self.settings.max_pages > 0 && page >= self.settings.max_pages {
                Some(StopReason::PageLimit)
            } else {
                None
            };

            let cursor = located.map(|next| next.url);
            match stop {
                Some(reason) => {
                    let cursor = if reason == StopReason::PageLimit {
                        cursor
                    } else {
                        None
                    };
                    checkpoint.set_page_cursor(cursor);
                    self.checkpointer
                        .persist_with_status(HarvestStatus::Completed)?;
                    break reason;
                }
                None => {
                    checkpoint.set_page_cursor(cursor.clone());
                    self.checkpointer.persist()?;
                    next_url = cursor;
                }
            }
        };

        let checkpoint = self.checkpointer.checkpoint();
        tracing::info!(
            "[{}] Finished after {} pages with {} results ({:?})",
            self.query_id,
            checkpoint.pages_fetched(),
            checkpoint.len(),
            stop
        );

        Ok(CrawlReport {
            query_id: self.query_id.clone(),
            pages: checkpoint.pages_fetched(),
            entries: checkpoint.entries().to_vec(),
            stop,
            pauses: self.checkpointer.pauses().len(),
        })
    }

    /// Persists the terminal status matching `error` and hands it back
    fn fail(&mut self, error: HarvestError) -> HarvestError {
        let status = match error {
            HarvestError::Cancelled => HarvestStatus::Cancelled,
            _ => HarvestStatus::Exhausted,
        };

        if let Err(e) = self.checkpointer.persist_with_status(status) {
            tracing::error!(
                "[{}] Failed to save {} checkpoint: {}",
                self.query_id,
                status,
                e
            );
        }

        match &error {
            HarvestError::Cancelled => tracing::info!(
                "[{}] Cancelled with {} results saved",
                self.query_id,
                self.checkpointer.checkpoint().len()
            ),
            other => tracing::error!("[{}] Stopped: {}", self.query_id, other),
        }

        error
    }
}
