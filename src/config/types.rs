use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Harrow
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub search: Option<SearchConfig>,
    #[serde(default, rename = "query")]
    pub queries: Vec<QueryEntry>,
}

impl Config {
    /// Returns the explicit queries followed by the ones generated from `[search]`
    pub fn all_queries(&self) -> Vec<QueryEntry> {
        let mut queries = self.queries.clone();
        if let Some(search) = &self.search {
            queries.extend(crate::url::expand_search_queries(search));
        }
        queries
    }
}

/// Which transport a fetch starts on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TransportPreference {
    #[default]
    DirectFirst,
    BrowserFirst,
}

/// Fetch engine behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Request budget per target site (requests per minute, 0 disables pacing)
    #[serde(rename = "rate-limit-rpm", default = "default_rpm")]
    pub rate_limit_rpm: u32,

    /// Lower bound of the inter-page delay (seconds)
    #[serde(rename = "min-delay", default = "default_min_delay")]
    pub min_delay: f64,

    /// Upper bound of the inter-page delay (seconds)
    #[serde(rename = "max-delay", default = "default_max_delay")]
    pub max_delay: f64,

    /// Retries per transport after the initial attempt
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-request deadline (seconds)
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(rename = "enable-ua-rotation", default = "default_true")]
    pub enable_ua_rotation: bool,

    #[serde(rename = "enable-delay-jitter", default = "default_true")]
    pub enable_delay_jitter: bool,

    /// Seconds between re-checks while waiting for a CAPTCHA to be solved
    #[serde(rename = "captcha-poll-interval", default = "default_poll_interval")]
    pub captcha_poll_interval: u64,

    #[serde(rename = "transport-preference", default)]
    pub transport_preference: TransportPreference,

    /// Base of the exponential backoff (seconds)
    #[serde(rename = "backoff-base", default = "default_backoff_base")]
    pub backoff_base: f64,

    /// Ceiling of the exponential part of the backoff (seconds)
    #[serde(rename = "backoff-cap", default = "default_backoff_cap")]
    pub backoff_cap: f64,

    /// Upper bound of the random jitter added to each backoff (seconds)
    #[serde(rename = "backoff-jitter", default = "default_backoff_jitter")]
    pub backoff_jitter: f64,

    /// Stop a query after this many pages (0 means no limit)
    #[serde(rename = "max-pages", default)]
    pub max_pages: u32,

    /// Number of queries harvested at the same time
    #[serde(rename = "max-concurrent-queries", default = "default_concurrency")]
    pub max_concurrent_queries: u32,
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn captcha_poll_interval(&self) -> Duration {
        Duration::from_secs(self.captcha_poll_interval)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rate_limit_rpm: default_rpm(),
            min_delay: default_min_delay(),
            max_delay: default_max_delay(),
            max_retries: default_max_retries(),
            timeout: default_timeout(),
            enable_ua_rotation: true,
            enable_delay_jitter: true,
            captcha_poll_interval: default_poll_interval(),
            transport_preference: TransportPreference::default(),
            backoff_base: default_backoff_base(),
            backoff_cap: default_backoff_cap(),
            backoff_jitter: default_backoff_jitter(),
            max_pages: 0,
            max_concurrent_queries: default_concurrency(),
        }
    }
}

/// Client identity configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityConfig {
    /// Proxy endpoint used by every identity (e.g. "http://127.0.0.1:8080")
    pub proxy: Option<String>,

    /// Fingerprint profile tag to start with (random when absent)
    #[serde(rename = "fingerprint-profile")]
    pub fingerprint_profile: Option<String>,
}

/// Blocking detection vocabulary
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Literal, case-sensitive substrings that identify a CAPTCHA page
    #[serde(rename = "captcha-markers", default = "default_captcha_markers")]
    pub captcha_markers: Vec<String>,

    /// Case-insensitive phrases that identify a defensive interstitial
    #[serde(rename = "blocking-indicators", default = "default_blocking_indicators")]
    pub blocking_indicators: Vec<String>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            captcha_markers: default_captcha_markers(),
            blocking_indicators: default_blocking_indicators(),
        }
    }
}

/// When a browser navigation counts as finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SettleMode {
    Load,
    #[default]
    NetworkIdle,
}

/// Browser transport configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    #[serde(default)]
    pub enabled: bool,

    /// DevTools HTTP endpoint of an already running browser
    #[serde(rename = "debugging-url", default = "default_debugging_url")]
    pub debugging_url: String,

    #[serde(default)]
    pub settle: SettleMode,

    /// Upper bound on the settle wait after navigation (milliseconds)
    #[serde(rename = "settle-timeout-ms", default = "default_settle_timeout_ms")]
    pub settle_timeout_ms: u64,

    /// Quiet period with no new network resources that counts as idle (milliseconds)
    #[serde(rename = "quiet-ms", default = "default_quiet_ms")]
    pub quiet_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            debugging_url: default_debugging_url(),
            settle: SettleMode::default(),
            settle_timeout_ms: default_settle_timeout_ms(),
            quiet_ms: default_quiet_ms(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite checkpoint database
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path of the JSON results export
    #[serde(rename = "export-path", default = "default_export_path")]
    pub export_path: String,
}

/// Search query generator: one query per site × location combination
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(rename = "base-url", default = "default_search_base")]
    pub base_url: String,

    /// Value of the `lr` parameter (e.g. "lang_en")
    pub language: Option<String>,

    pub sites: Vec<String>,

    #[serde(default)]
    pub locations: Vec<String>,

    #[serde(default)]
    pub keywords: String,

    #[serde(rename = "date-filter")]
    pub date_filter: Option<String>,
}

/// A single query to paginate through
#[derive(Debug, Clone, Deserialize)]
pub struct QueryEntry {
    /// Stable identifier used as the checkpoint key
    pub id: String,

    /// First page of results
    pub url: String,

    /// CSS selector for result links (search-result blocks when absent)
    #[serde(rename = "result-selector")]
    pub result_selector: Option<String>,

    /// CSS selector, relative to each result link, for its title
    #[serde(rename = "title-selector")]
    pub title_selector: Option<String>,

    /// Ordered "next page" selectors replacing the built-in chain
    #[serde(rename = "next-selectors", default)]
    pub next_selectors: Vec<String>,
}

fn default_rpm() -> u32 {
    20
}

fn default_min_delay() -> f64 {
    5.0
}

fn default_max_delay() -> f64 {
    20.0
}

fn default_max_retries() -> u32 {
    2
}

fn default_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    20
}

fn default_backoff_base() -> f64 {
    1.0
}

fn default_backoff_cap() -> f64 {
    30.0
}

fn default_backoff_jitter() -> f64 {
    1.0
}

fn default_concurrency() -> u32 {
    1
}

fn default_debugging_url() -> String {
    "http://127.0.0.1:9222".to_string()
}

fn default_settle_timeout_ms() -> u64 {
    10_000
}

fn default_quiet_ms() -> u64 {
    750
}

fn default_export_path() -> String {
    "./harvest_results.json".to_string()
}

fn default_search_base() -> String {
    "https://www.google.com/search".to_string()
}

/// Literal markers left by common CAPTCHA widgets
pub fn default_captcha_markers() -> Vec<String> {
    [
        "id=\"recaptcha-anchor-label\"",
        "id=\"rc-anchor-container\"",
        "g-recaptcha",
        "class=\"grecaptcha\"",
        "data-sitekey",
        "recaptcha",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Phrases and vendor names that show up on defensive interstitials
///
/// Single generic words ("bot", "blocked") are left out: they appear on
/// ordinary result pages. Add them in `[detection]` for targets where they
/// are reliable.
pub fn default_blocking_indicators() -> Vec<String> {
    [
        "access denied",
        "unusual traffic",
        "security check",
        "sorry we just need to make sure",
        "are you a robot",
        "verify you are human",
        "cloudflare",
        "distil",
        "datadome",
        "incapsula",
        "akamai",
        "perimeterx",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
