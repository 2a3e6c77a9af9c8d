//! Harrow: a resilient harvester for defended web properties
//!
//! This crate fetches paginated result listings (search engines, job boards)
//! from sites that push back against automated access. It paces requests,
//! rotates client identities, classifies blocking responses, retries with
//! backoff, escalates from a plain HTTP client to a real browser, and pauses
//! for manual CAPTCHA resolution without losing progress.

pub mod config;
pub mod crawler;
pub mod fetch;
pub mod identity;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Harrow operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Retries exhausted for {url} after {attempts} attempts: {last_error}")]
    Exhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Harvest cancelled")]
    Cancelled,

    #[error("Browser transport requested but no browser session is available")]
    BrowserUnavailable,

    #[error("No transport configured for {url}")]
    NoTransport { url: String },

    #[error("Browser session error: {0}")]
    Browser(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Returns true for the terminal outcomes a crawl surfaces to its caller
    pub fn is_terminal_fetch_outcome(&self) -> bool {
        matches!(self, Self::Exhausted { .. } | Self::Cancelled)
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector: {0}")]
    InvalidSelector(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL: {0}")]
    MissingHost(String),
}

/// Result type alias for Harrow operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Harvester, PaginationCrawler};
pub use fetch::{BlockingDetector, FetchEngine, FetchRequest, FetchResult, RateLimiter};
pub use identity::{ClientIdentity, IdentityRotator};
pub use state::{AttemptState, HarvestStatus};
