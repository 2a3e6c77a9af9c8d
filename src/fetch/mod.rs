//! Fetch module: one page, fetched resiliently
//!
//! This module handles every network-facing concern of a harvest:
//! - Request pacing per target site (`RateLimiter`)
//! - Classifying responses as clean or blocked (`BlockingDetector`)
//! - Executing requests through a plain HTTP client or a real browser (`Transport`)
//! - Retrying with backoff and escalating between transports (`FetchEngine`)

pub mod browser;
mod detector;
mod direct;
mod engine;
mod rate_limiter;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use browser::{BrowserSession, BrowserTransport, CdpSession, PageHandle, PageResponse};
pub use detector::{BlockingDetector, Classification};
pub use direct::DirectTransport;
pub use engine::{CaptchaHandler, EngineSettings, FetchEngine, PageRecheck};
pub use rate_limiter::RateLimiter;
pub use transport::Transport;

use crate::config::TransportPreference;
use crate::HarvestError;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Which transport produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Direct,
    Browser,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Browser => "browser",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<TransportPreference> for TransportKind {
    fn from(preference: TransportPreference) -> Self {
        match preference {
            TransportPreference::DirectFirst => Self::Direct,
            TransportPreference::BrowserFirst => Self::Browser,
        }
    }
}

/// Why a response was judged to be a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// A challenge only a human can clear
    Captcha,
    /// Rate-limit statuses or anti-bot interstitials
    Defensive,
}

/// Outcome tag of a fetch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success,
    Blocked(BlockKind),
    /// Timeout, connection failure, or unreadable response
    TransportError(String),
}

/// A request for one page
///
/// Built once per page and passed by reference to every attempt.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    /// Logical client the request is made on behalf of (used in logs)
    pub client_id: String,
    pub preference: TransportPreference,
    pub timeout: Duration,
    /// Extra headers sent after the identity's own headers
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client_id: client_id.into(),
            preference: TransportPreference::default(),
            timeout: Duration::from_secs(30),
            headers: Vec::new(),
        }
    }

    pub fn with_preference(mut self, preference: TransportPreference) -> Self {
        self.preference = preference;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Result of a single fetch attempt
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub url: String,
    /// Absent when the transport failed before a response arrived
    pub status: Option<u16>,
    pub body: String,
    pub elapsed: Duration,
    pub transport: TransportKind,
    pub outcome: FetchOutcome,
}

impl FetchResult {
    /// A completed response, not yet classified
    pub fn completed(
        url: impl Into<String>,
        status: u16,
        body: String,
        elapsed: Duration,
        transport: TransportKind,
    ) -> Self {
        Self {
            url: url.into(),
            status: Some(status),
            body,
            elapsed,
            transport,
            outcome: FetchOutcome::Success,
        }
    }

    pub fn transport_error(
        url: impl Into<String>,
        error: impl Into<String>,
        elapsed: Duration,
        transport: TransportKind,
    ) -> Self {
        Self {
            url: url.into(),
            status: None,
            body: String::new(),
            elapsed,
            transport,
            outcome: FetchOutcome::TransportError(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == FetchOutcome::Success
    }

    pub fn block_kind(&self) -> Option<BlockKind> {
        match self.outcome {
            FetchOutcome::Blocked(kind) => Some(kind),
            _ => None,
        }
    }

    /// Short description of a failed outcome, used as the retry error
    pub fn describe_failure(&self) -> String {
        match &self.outcome {
            FetchOutcome::Success => "success".to_string(),
            FetchOutcome::Blocked(BlockKind::Captcha) => "captcha challenge".to_string(),
            FetchOutcome::Blocked(BlockKind::Defensive) => match self.status {
                Some(status) => format!("blocked (HTTP {})", status),
                None => "blocked".to_string(),
            },
            FetchOutcome::TransportError(e) => e.clone(),
        }
    }
}

/// Sleeps for `duration` unless the token is cancelled first
pub async fn sleep_or_cancel(
    duration: Duration,
    cancel: &CancellationToken,
) -> Result<(), HarvestError> {
    if duration.is_zero() {
        return if cancel.is_cancelled() {
            Err(HarvestError::Cancelled)
        } else {
            Ok(())
        };
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(HarvestError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
