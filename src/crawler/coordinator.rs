//! Harvest coordinator - runs every configured query
//!
//! This module wires the shared pieces of a harvest together:
//! - One checkpoint store and one cancellation token for the whole run
//! - One browser session, if any, shared by every query
//! - One fetch engine per target site, so queries against the same site
//!   share its rate limiter and identity rotator
//! - One task per query, bounded by `max-concurrent-queries`

use crate::config::{Config, QueryEntry, TransportPreference};
use crate::crawler::paginator::{CrawlReport, CrawlSettings, PaginationCrawler};
use crate::fetch::{
    BlockingDetector, BrowserSession, BrowserTransport, CdpSession, DirectTransport,
    EngineSettings, FetchEngine, RateLimiter, Transport,
};
use crate::identity::IdentityRotator;
use crate::storage::{CheckpointStore, RunStatus};
use crate::url::site_key;
use crate::{HarvestError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Outcome of a harvest run
#[derive(Debug, Default)]
pub struct HarvestSummary {
    pub run_id: i64,
    /// Queries that paginated to a normal stop, ordered by query id
    pub completed: Vec<CrawlReport>,
    /// Queries that ran out of retries, with the error
    pub failed: Vec<(String, String)>,
    /// Queries stopped by cancellation
    pub cancelled: Vec<String>,
    pub status: Option<RunStatus>,
}

impl HarvestSummary {
    pub fn total_results(&self) -> usize {
        self.completed.iter().map(|r| r.entries.len()).sum()
    }
}

/// Runs all queries of a configuration
pub struct Harvester {
    config: Arc<Config>,
    config_hash: String,
    store: Arc<dyn CheckpointStore>,
    cancel: CancellationToken,
    browser: Option<Arc<dyn BrowserSession>>,
}

impl Harvester {
    pub fn new(
        config: Config,
        config_hash: impl Into<String>,
        store: Arc<dyn CheckpointStore>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config: Arc::new(config),
            config_hash: config_hash.into(),
            store,
            cancel,
            browser: None,
        }
    }

    /// Uses `session` instead of attaching to `[browser] debugging-url`
    pub fn with_browser_session(mut self, session: Arc<dyn BrowserSession>) -> Self {
        self.browser = Some(session);
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Deletes every stored checkpoint
    pub fn clear_checkpoints(&self) -> Result<usize> {
        let cleared = self.store.clear_checkpoints()?;
        tracing::info!("Cleared {} stored checkpoints", cleared);
        Ok(cleared)
    }

    /// Runs every query to completion, failure, or cancellation
    ///
    /// Individual query failures are reported in the summary; only setup
    /// failures (bad configuration, unavailable storage, a required browser
    /// that cannot be reached) are returned as errors.
    pub async fn run(&self) -> Result<HarvestSummary> {
        let queries = self.config.all_queries();
        let browser = self.browser_transport().await?;
        let crawlers = self.build_crawlers(&queries, browser)?;

        let run_id = self.store.create_run(&self.config_hash)?;
        tracing::info!(
            "Starting harvest run {} with {} queries",
            run_id,
            crawlers.len()
        );

        let permits = self.config.engine.max_concurrent_queries.max(1) as usize;
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut tasks = JoinSet::new();

        for crawler in crawlers {
            let semaphore = Arc::clone(&semaphore);
            let cancel = self.cancel.clone();
            let query_id = crawler.query_id().to_string();

            tasks.spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return (query_id, Err(HarvestError::Cancelled)),
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return (query_id, Err(HarvestError::Cancelled)),
                    },
                };
                let outcome = crawler.run().await;
                (query_id, outcome)
            });
        }

        let mut summary = HarvestSummary {
            run_id,
            ..HarvestSummary::default()
        };

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(report))) => summary.completed.push(report),
                Ok((query_id, Err(HarvestError::Cancelled))) => summary.cancelled.push(query_id),
                Ok((query_id, Err(e))) => summary.failed.push((query_id, e.to_string())),
                Err(e) => {
                    tracing::error!("Query task failed: {}", e);
                    summary.failed.push(("<task>".to_string(), e.to_string()));
                }
            }
        }

        summary.completed.sort_by(|a, b| a.query_id.cmp(&b.query_id));
        summary.failed.sort();
        summary.cancelled.sort();

        let status = if self.cancel.is_cancelled() || !summary.cancelled.is_empty() {
            RunStatus::Interrupted
        } else if !summary.failed.is_empty() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        self.store.finish_run(run_id, status)?;
        summary.status = Some(status);

        tracing::info!(
            "Run {} {}: {} queries completed, {} failed, {} cancelled, {} results",
            run_id,
            status.to_db_string(),
            summary.completed.len(),
            summary.failed.len(),
            summary.cancelled.len(),
            summary.total_results()
        );

        Ok(summary)
    }

    /// The shared browser transport, if a browser is configured and reachable
    ///
    /// An unreachable browser is only an error when queries start on it.
    async fn browser_transport(&self) -> Result<Option<Arc<dyn Transport>>> {
        let settle = self.config.browser.settle;

        let session: Arc<dyn BrowserSession> = match &self.browser {
            Some(session) => Arc::clone(session),
            None if self.config.browser.enabled => {
                match CdpSession::connect(&self.config.browser).await {
                    Ok(session) => Arc::new(session),
                    Err(e)
                        if self.config.engine.transport_preference
                            == TransportPreference::BrowserFirst =>
                    {
                        return Err(e);
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Browser unavailable, continuing with direct requests only: {}",
                            e
                        );
                        return Ok(None);
                    }
                }
            }
            None => return Ok(None),
        };

        Ok(Some(Arc::new(BrowserTransport::new(session, settle))))
    }

    /// One crawler per query, with engines shared per target site
    fn build_crawlers(
        &self,
        queries: &[QueryEntry],
        browser: Option<Arc<dyn Transport>>,
    ) -> Result<Vec<PaginationCrawler>> {
        let engine_config = &self.config.engine;
        let detector = Arc::new(BlockingDetector::new(&self.config.detection)?);
        let direct: Arc<dyn Transport> = Arc::new(DirectTransport::new());
        let settings = EngineSettings::from_config(engine_config);
        let crawl_settings = CrawlSettings::from_config(engine_config);

        let mut engines: HashMap<String, Arc<FetchEngine>> = HashMap::new();
        let mut crawlers = Vec::with_capacity(queries.len());

        for query in queries {
            let site = site_key(&query.url)?;
            let engine = engines
                .entry(site.clone())
                .or_insert_with(|| {
                    tracing::debug!("New fetch engine for {}", site);
                    let mut engine = FetchEngine::new(
                        settings.clone(),
                        Arc::clone(&detector),
                        Arc::new(RateLimiter::from_rpm(engine_config.rate_limit_rpm)),
                        Arc::new(IdentityRotator::from_config(
                            &self.config.identity,
                            engine_config.enable_ua_rotation,
                        )),
                        self.cancel.clone(),
                    )
                    .with_direct(Arc::clone(&direct));
                    if let Some(browser) = &browser {
                        engine = engine.with_browser(Arc::clone(browser));
                    }
                    Arc::new(engine)
                })
                .clone();

            crawlers.push(PaginationCrawler::new(
                query,
                engine,
                Arc::clone(&self.store),
                crawl_settings.clone(),
            )?);
        }

        Ok(crawlers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::storage::SqliteCheckpointStore;

    fn config(extra: &str) -> Config {
        let toml = format!(
            r#"
[output]
database-path = "./harvest.db"

{}
"#,
            extra
        );
        parse_config(&toml).unwrap()
    }

    #[tokio::test]
    async fn test_engines_are_shared_per_site() {
        let config = config(
            r#"
[[query]]
id = "a"
url = "https://www.google.com/search?q=a"

[[query]]
id = "b"
url = "https://google.com/search?q=b"

[[query]]
id = "c"
url = "https://boards.example.com/jobs"
"#,
        );
        let store = Arc::new(SqliteCheckpointStore::new_in_memory().unwrap());
        let harvester = Harvester::new(config, "hash", store, CancellationToken::new());

        let queries = harvester.config.all_queries();
        let crawlers = harvester.build_crawlers(&queries, None).unwrap();

        assert_eq!(crawlers.len(), 3);
        assert!(Arc::ptr_eq(crawlers[0].engine(), crawlers[1].engine()));
        assert!(!Arc::ptr_eq(crawlers[0].engine(), crawlers[2].engine()));
        assert!(Arc::ptr_eq(
            crawlers[0].engine().identities(),
            crawlers[1].engine().identities()
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let config = config(
            r#"
[[query]]
id = "a"
url = "https://www.google.com/search?q=a"
"#,
        );
        let store = Arc::new(SqliteCheckpointStore::new_in_memory().unwrap());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let harvester = Harvester::new(config, "hash", store.clone(), cancel);

        let summary = harvester.run().await.unwrap();

        assert_eq!(summary.cancelled, vec!["a".to_string()]);
        assert_eq!(summary.status, Some(RunStatus::Interrupted));
        let run = store.get_latest_run().unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Interrupted);
        assert_eq!(run.config_hash, "hash");
    }

    #[tokio::test]
    async fn test_browser_first_needs_reachable_browser() {
        let config = config(
            r#"
[engine]
transport-preference = "browser-first"
rate-limit-rpm = 0

[browser]
enabled = true
debugging-url = "http://127.0.0.1:9"

[[query]]
id = "a"
url = "https://www.google.com/search?q=a"
"#,
        );
        let store = Arc::new(SqliteCheckpointStore::new_in_memory().unwrap());
        let harvester = Harvester::new(config, "hash", store.clone(), CancellationToken::new());

        assert!(harvester.run().await.is_err());
        assert!(store.get_latest_run().unwrap().is_none());
    }

    #[test]
    fn test_clear_checkpoints() {
        let store = Arc::new(SqliteCheckpointStore::new_in_memory().unwrap());
        let harvester = Harvester::new(
            config(
                r#"
[[query]]
id = "a"
url = "https://www.google.com/search?q=a"
"#,
            ),
            "hash",
            store,
            CancellationToken::new(),
        );
        assert_eq!(harvester.clear_checkpoints().unwrap(), 0);
    }
}
