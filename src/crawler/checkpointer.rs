//! Per-query progress and the CAPTCHA pause protocol
//!
//! `CrawlCheckpoint` is the in-memory result set of one query.
//! `CrawlCheckpointer` writes it through a `CheckpointStore` after every page
//! and whenever a CAPTCHA stops the query.

use crate::crawler::extractor::Candidate;
use crate::fetch::{CaptchaHandler, FetchOutcome, FetchResult, PageRecheck};
use crate::state::HarvestStatus;
use crate::storage::{CheckpointRecord, CheckpointStore, HarvestEntry};
use crate::{HarvestError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Ordered, deduplicated results of one query
///
/// A URL is kept at most once, compared by exact string equality, in the
/// order it was first seen.
#[derive(Debug, Clone)]
pub struct CrawlCheckpoint {
    query_id: String,
    entries: Vec<HarvestEntry>,
    seen: HashSet<String>,
    page_cursor: Option<String>,
    pages_fetched: u32,
    status: HarvestStatus,
    last_updated: Option<DateTime<Utc>>,
}

impl CrawlCheckpoint {
    pub fn new(query_id: impl Into<String>) -> Self {
        Self {
            query_id: query_id.into(),
            entries: Vec::new(),
            seen: HashSet::new(),
            page_cursor: None,
            pages_fetched: 0,
            status: HarvestStatus::Running,
            last_updated: None,
        }
    }

    /// Appends the candidates not seen before, returning how many were new
    pub fn extend(&mut self, candidates: impl IntoIterator<Item = Candidate>) -> usize {
        let mut added = 0;
        for candidate in candidates {
            if self.seen.insert(candidate.url.clone()) {
                self.entries
                    .push(HarvestEntry::new(candidate.url, candidate.title));
                added += 1;
            }
        }
        added
    }

    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    pub fn entries(&self) -> &[HarvestEntry] {
        &self.entries
    }

    pub fn urls(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.url.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn page_cursor(&self) -> Option<&str> {
        self.page_cursor.as_deref()
    }

    pub fn set_page_cursor(&mut self, cursor: Option<String>) {
        self.page_cursor = cursor;
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    pub fn record_page(&mut self) {
        self.pages_fetched += 1;
    }

    pub fn status(&self) -> HarvestStatus {
        self.status
    }

    pub fn set_status(&mut self, status: HarvestStatus) {
        self.status = status;
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    /// Snapshot for the store, stamped with the current time
    fn snapshot(&mut self) -> CheckpointRecord {
        let now = Utc::now();
        self.last_updated = Some(now);

        CheckpointRecord {
            query_id: self.query_id.clone(),
            entries: self.entries.clone(),
            page_cursor: self.page_cursor.clone(),
            pages_fetched: self.pages_fetched,
            status: self.status,
            last_updated: now.to_rfc3339(),
        }
    }
}

/// How a CAPTCHA pause ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseReport {
    /// Sleep-then-recheck cycles until the page came back clean
    pub polls: u32,
}

/// Persists one query's checkpoint and runs the CAPTCHA pause protocol
pub struct CrawlCheckpointer {
    store: Arc<dyn CheckpointStore>,
    checkpoint: CrawlCheckpoint,
    writes: u32,
    pauses: Vec<PauseReport>,
}

impl CrawlCheckpointer {
    pub fn new(store: Arc<dyn CheckpointStore>, query_id: impl Into<String>) -> Self {
        Self {
            store,
            checkpoint: CrawlCheckpoint::new(query_id),
            writes: 0,
            pauses: Vec::new(),
        }
    }

    pub fn checkpoint(&self) -> &CrawlCheckpoint {
        &self.checkpoint
    }

    pub fn checkpoint_mut(&mut self) -> &mut CrawlCheckpoint {
        &mut self.checkpoint
    }

    /// Number of checkpoint writes so far
    pub fn writes(&self) -> u32 {
        self.writes
    }

    /// Completed CAPTCHA pauses, oldest first
    pub fn pauses(&self) -> &[PauseReport] {
        &self.pauses
    }

    /// Overwrites the stored checkpoint with the current one
    pub fn persist(&mut self) -> Result<()> {
        let record = self.checkpoint.snapshot();
        self.store.save_checkpoint(&record)?;
        self.writes += 1;

        tracing::debug!(
            "[{}] Checkpoint saved: {} results, {} pages, {}",
            record.query_id,
            record.entries.len(),
            record.pages_fetched,
            record.status
        );
        Ok(())
    }

    /// Sets the status and persists
    pub fn persist_with_status(&mut self, status: HarvestStatus) -> Result<()> {
        self.checkpoint.set_status(status);
        self.persist()
    }

    /// Waits for an operator to clear a CAPTCHA
    ///
    /// Saves progress as `paused`, then re-checks the blocked page every
    /// `poll_interval` until it comes back clean, and returns that clean page.
    /// There is no upper bound on the wait; cancelling `cancel` ends it with
    /// `HarvestError::Cancelled`.
    pub async fn pause_for_manual_resolution(
        &mut self,
        trigger: &FetchResult,
        recheck: &dyn PageRecheck,
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<(PauseReport, FetchResult)> {
        self.persist_with_status(HarvestStatus::Paused)?;

        tracing::warn!(
            "[{}] CAPTCHA at {}. Solve it in the browser; re-checking every {}s ({} results saved)",
            self.checkpoint.query_id(),
            trigger.url,
            poll_interval.as_secs(),
            self.checkpoint.len()
        );

        let mut polls = 0;
        let cleared = loop {
            if cancel.is_cancelled() {
                return Err(HarvestError::Cancelled);
            }
            crate::fetch::sleep_or_cancel(poll_interval, cancel).await?;
            polls += 1;

            let result = recheck.recheck().await?;
            if result.is_success() {
                break result;
            }
            match &result.outcome {
                FetchOutcome::Success => {}
                FetchOutcome::Blocked(kind) => {
                    tracing::debug!(
                        "[{}] Still blocked ({:?}) after {} checks",
                        self.checkpoint.query_id(),
                        kind,
                        polls
                    );
                }
                FetchOutcome::TransportError(e) => {
                    tracing::debug!(
                        "[{}] Re-check failed: {}",
                        self.checkpoint.query_id(),
                        e
                    );
                }
            }
        };

        tracing::info!(
            "[{}] CAPTCHA cleared after {} checks, resuming",
            self.checkpoint.query_id(),
            polls
        );
        self.checkpoint.set_status(HarvestStatus::Running);

        let report = PauseReport { polls };
        self.pauses.push(report);
        Ok((report, cleared))
    }
}

#[async_trait]
impl CaptchaHandler for CrawlCheckpointer {
    async fn on_captcha(
        &mut self,
        trigger: &FetchResult,
        recheck: &dyn PageRecheck,
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<FetchResult>> {
        self.pause_for_manual_resolution(trigger, recheck, poll_interval, cancel)
            .await
            .map(|(_, cleared)| Some(cleared))
    }
}
