//! Integration tests for the harvester
//!
//! These tests use wiremock to create mock HTTP servers and run whole
//! harvests end-to-end against them.

use async_trait::async_trait;
use harrow::config::{parse_config, Config, SettleMode};
use harrow::crawler::{Harvester, StopReason};
use harrow::fetch::{BrowserSession, PageHandle, PageResponse};
use harrow::identity::ClientIdentity;
use harrow::output::{collect_rows, export_results};
use harrow::state::HarvestStatus;
use harrow::storage::{open_store, CheckpointStore, RunStatus};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CAPTCHA_PAGE: &str =
    r#"<html><body><form id="captcha-form"><div class="g-recaptcha" data-sitekey="x"></div></form></body></html>"#;

/// A result page with organic results and an optional next link
fn results_page(ids: &[&str], next: Option<&str>) -> String {
    let mut html = String::from("<html><head><title>Results</title></head><body><div id=\"search\">");
    for id in ids {
        html.push_str(&format!(
            r#"<div class="g"><a href="https://jobs.example.com/{id}"><h3>Job {id}</h3></a></div>"#,
            id = id
        ));
    }
    html.push_str("</div>");
    if let Some(next) = next {
        html.push_str(&format!(r#"<a id="pnnext" href="{}">Next</a>"#, next));
    }
    html.push_str("</body></html>");
    html
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html")
}

/// Creates a test configuration with one query against `start_url`
fn create_test_config(start_url: &str, db_path: &Path, extra_engine: &str) -> Config {
    let toml = format!(
        r#"
[engine]
rate-limit-rpm = 0
enable-delay-jitter = false
min-delay = 0.0
max-delay = 0.0
max-retries = 1
timeout = 5
captcha-poll-interval = 1
backoff-base = 0.01
backoff-cap = 0.05
backoff-jitter = 0.0
{extra}

[output]
database-path = "{db}"
export-path = "{export}"

[[query]]
id = "jobs"
url = "{url}"
"#,
        extra = extra_engine,
        db = db_path.display(),
        export = db_path.with_extension("json").display(),
        url = start_url,
    );
    parse_config(&toml).expect("test config should be valid")
}

fn urls(rows: &[harrow::output::ExportRow]) -> Vec<String> {
    rows.iter().map(|r| r.url.clone()).collect()
}

fn job(id: &str) -> String {
    format!("https://jobs.example.com/{}", id)
}

#[tokio::test]
async fn test_three_pages_ending_on_empty_page() {
    let mock_server = MockServer::start().await;
    let start_url = format!("{}/search?q=jobs", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("start", "10"))
        .respond_with(html(results_page(&["b", "c"], Some("/search?q=jobs&start=20"))))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("start", "20"))
        .respond_with(html(results_page(&[], Some("/search?q=jobs&start=30"))))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(html(results_page(&["a", "b"], Some("/search?q=jobs&start=10"))))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("harvest.db");
    let config = create_test_config(&start_url, &db_path, "");
    let store = Arc::new(open_store(&db_path).unwrap());

    let summary = Harvester::new(config, "hash", store.clone(), CancellationToken::new())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.status, Some(RunStatus::Completed));
    assert_eq!(summary.completed.len(), 1);
    let report = &summary.completed[0];
    assert_eq!(report.stop, StopReason::EmptyPage);
    assert_eq!(report.pages, 3);

    // Progress survives the process: reopen the database file
    drop(store);
    let reopened = open_store(&db_path).unwrap();
    let saved = reopened.load_checkpoint("jobs").unwrap().unwrap();
    assert_eq!(saved.status, HarvestStatus::Completed);
    assert_eq!(saved.pages_fetched, 3);

    let rows = collect_rows(&reopened).unwrap();
    assert_eq!(urls(&rows), vec![job("a"), job("b"), job("c")]);
    assert_eq!(rows[0].title, "Job a");

    let export_path = dir.path().join("results.json");
    assert_eq!(export_results(&reopened, &export_path).unwrap(), 3);

    let run = reopened.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.finished_at.is_some());
}

#[tokio::test]
async fn test_recovers_from_transient_block() {
    let mock_server = MockServer::start().await;
    let start_url = format!("{}/search?q=jobs", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(html(results_page(&["a"], None)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("harvest.db");
    let config = create_test_config(&start_url, &db_path, "");
    let store = Arc::new(open_store(&db_path).unwrap());

    let summary = Harvester::new(config, "hash", store, CancellationToken::new())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.completed.len(), 1);
    assert_eq!(summary.completed[0].stop, StopReason::NoNextPage);
    assert_eq!(summary.total_results(), 1);
}

#[tokio::test]
async fn test_redirected_listing_resolves_relative_links() {
    let mock_server = MockServer::start().await;
    let start_url = format!("{}/start", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/listing/first"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/listing/first"))
        .respond_with(html(results_page(&["a"], Some("second"))))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/listing/second"))
        .respond_with(html(results_page(&["b"], None)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("harvest.db");
    let config = create_test_config(&start_url, &db_path, "");
    let store = Arc::new(open_store(&db_path).unwrap());

    let summary = Harvester::new(config, "hash", store.clone(), CancellationToken::new())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.completed.len(), 1);
    assert_eq!(summary.completed[0].pages, 2);
    assert_eq!(summary.completed[0].stop, StopReason::NoNextPage);
    let rows = collect_rows(store.as_ref()).unwrap();
    assert_eq!(urls(&rows), vec![job("a"), job("b")]);
}

#[tokio::test]
async fn test_persistent_block_exhausts_query() {
    let mock_server = MockServer::start().await;
    let start_url = format!("{}/search?q=jobs", mock_server.uri());

    // max-retries = 1: the first attempt and one retry
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(429))
        .expect(2)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("harvest.db");
    let config = create_test_config(&start_url, &db_path, "");
    let store = Arc::new(open_store(&db_path).unwrap());

    let summary = Harvester::new(config, "hash", store.clone(), CancellationToken::new())
        .run()
        .await
        .unwrap();

    assert!(summary.completed.is_empty());
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, "jobs");
    assert!(summary.failed[0].1.contains("2 attempts"));
    assert_eq!(summary.status, Some(RunStatus::Failed));

    let saved = store.load_checkpoint("jobs").unwrap().unwrap();
    assert_eq!(saved.status, HarvestStatus::Exhausted);
    assert!(saved.entries.is_empty());
}

#[tokio::test]
async fn test_captcha_pause_then_resume() {
    let mock_server = MockServer::start().await;
    let start_url = format!("{}/search?q=jobs", mock_server.uri());

    // Triggering attempt plus one re-check see the challenge
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(html(CAPTCHA_PAGE.to_string()))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;

    // Second re-check comes back clean and is used as the page
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(html(results_page(&["a", "b"], None)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("harvest.db");
    let config = create_test_config(&start_url, &db_path, "");
    let store = Arc::new(open_store(&db_path).unwrap());

    let summary = Harvester::new(config, "hash", store.clone(), CancellationToken::new())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.completed.len(), 1);
    let report = &summary.completed[0];
    assert_eq!(report.pauses, 1);
    assert_eq!(report.entries.len(), 2);
    assert_eq!(
        store.load_checkpoint("jobs").unwrap().unwrap().status,
        HarvestStatus::Completed
    );
}

#[tokio::test]
async fn test_cancellation_during_captcha_pause() {
    let mock_server = MockServer::start().await;
    let start_url = format!("{}/search?q=jobs", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(html(CAPTCHA_PAGE.to_string()))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("harvest.db");
    let config = create_test_config(&start_url, &db_path, "");
    let store = Arc::new(open_store(&db_path).unwrap());
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(2500)).await;
        canceller.cancel();
    });

    let summary = Harvester::new(config, "hash", store.clone(), cancel)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.cancelled, vec!["jobs".to_string()]);
    assert_eq!(summary.status, Some(RunStatus::Interrupted));
    assert_eq!(
        store.load_checkpoint("jobs").unwrap().unwrap().status,
        HarvestStatus::Cancelled
    );
}

/// Browser session that renders a fixed document for every navigation
struct StaticBrowser {
    body: String,
    navigations: Arc<AtomicUsize>,
}

struct StaticPage {
    body: String,
    navigations: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserSession for StaticBrowser {
    async fn new_page(&self) -> harrow::Result<Box<dyn PageHandle>> {
        Ok(Box::new(StaticPage {
            body: self.body.clone(),
            navigations: Arc::clone(&self.navigations),
        }))
    }
}

#[async_trait]
impl PageHandle for StaticPage {
    async fn prepare(
        &mut self,
        _identity: &ClientIdentity,
        _init_script: &str,
    ) -> harrow::Result<()> {
        Ok(())
    }

    async fn navigate(&mut self, _url: &str, _settle: SettleMode) -> harrow::Result<PageResponse> {
        self.navigations.fetch_add(1, Ordering::SeqCst);
        self.current_document().await
    }

    async fn current_document(&mut self) -> harrow::Result<PageResponse> {
        Ok(PageResponse {
            status: 200,
            body: self.body.clone(),
            final_url: None,
        })
    }

    async fn close(self: Box<Self>) {}
}

#[tokio::test]
async fn test_defensive_block_escalates_to_browser() {
    let mock_server = MockServer::start().await;
    let start_url = format!("{}/search?q=jobs", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(403))
        .expect(2)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("harvest.db");
    let config = create_test_config(&start_url, &db_path, "");
    let store = Arc::new(open_store(&db_path).unwrap());
    let navigations = Arc::new(AtomicUsize::new(0));
    let browser = Arc::new(StaticBrowser {
        body: results_page(&["a"], None),
        navigations: Arc::clone(&navigations),
    });

    let summary = Harvester::new(config, "hash", store, CancellationToken::new())
        .with_browser_session(browser)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.completed.len(), 1);
    assert_eq!(summary.total_results(), 1);
    assert_eq!(navigations.load(Ordering::SeqCst), 1);
}
