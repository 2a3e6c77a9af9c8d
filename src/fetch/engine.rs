//! Retry and escalation policy
//!
//! A logical fetch moves through `Attempting(n)` → (`Backoff(n)` →
//! `Attempting(n + 1)`)* → `Succeeded` | `Exhausted`.
//!
//! # Per-attempt outcome handling
//!
//! | Outcome | n < max-retries | n = max-retries |
//! |---------|-----------------|-----------------|
//! | Clean | Succeeded, identity rotates | Succeeded, identity rotates |
//! | CAPTCHA | pause for the operator; the cleared page is the result | pause for the operator; the cleared page is the result |
//! | Defensive block | backoff, then n + 1 | escalate to the browser once, else Exhausted |
//! | Transport error | backoff, then n + 1 | Exhausted |

use crate::config::EngineConfig;
use crate::fetch::{
    sleep_or_cancel, BlockKind, BlockingDetector, FetchOutcome, FetchRequest, FetchResult,
    RateLimiter, Transport, TransportKind,
};
use crate::identity::IdentityRotator;
use crate::state::RetryState;
use crate::{HarvestError, Result};
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Looks again at the page that raised a CAPTCHA
#[async_trait]
pub trait PageRecheck: Send + Sync {
    /// Re-reads and classifies the page
    ///
    /// A browser tab left open on the challenge is read in place; otherwise
    /// the page is fetched again on the same transport.
    async fn recheck(&self) -> Result<FetchResult>;
}

/// Receives control when a fetch hits a CAPTCHA
///
/// `Ok(Some(result))` hands back the clean page seen once the challenge was
/// cleared, and becomes the result of the fetch. `Ok(None)` means the
/// challenge is gone but the page should be fetched again.
#[async_trait]
pub trait CaptchaHandler: Send {
    async fn on_captcha(
        &mut self,
        trigger: &FetchResult,
        recheck: &dyn PageRecheck,
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<FetchResult>>;
}

/// Retry and backoff parameters
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Retries per transport after the initial attempt
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub backoff_jitter: Duration,
    pub captcha_poll_interval: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base: Duration::from_secs_f64(config.backoff_base),
            backoff_cap: Duration::from_secs_f64(config.backoff_cap),
            backoff_jitter: Duration::from_secs_f64(config.backoff_jitter),
            captcha_poll_interval: config.captcha_poll_interval(),
        }
    }

    /// Backoff after failed attempt `attempt`: `min(cap, base · 2^attempt)` plus jitter
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self.backoff_base.as_secs_f64() * 2f64.powi(attempt.min(62) as i32);
        let capped = exponential.min(self.backoff_cap.as_secs_f64());

        let jitter = self.backoff_jitter.as_secs_f64();
        let jitter = if jitter > 0.0 {
            rand::thread_rng().gen_range(0.0..=jitter)
        } else {
            0.0
        };

        Duration::from_secs_f64(capped + jitter)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Fetches pages for one target site
///
/// The limiter and identity rotator are shared with every other engine
/// targeting the same site; transports and the detector may be shared more
/// widely.
pub struct FetchEngine {
    settings: EngineSettings,
    direct: Option<Arc<dyn Transport>>,
    browser: Option<Arc<dyn Transport>>,
    detector: Arc<BlockingDetector>,
    limiter: Arc<RateLimiter>,
    identities: Arc<IdentityRotator>,
    cancel: CancellationToken,
}

impl FetchEngine {
    pub fn new(
        settings: EngineSettings,
        detector: Arc<BlockingDetector>,
        limiter: Arc<RateLimiter>,
        identities: Arc<IdentityRotator>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            settings,
            direct: None,
            browser: None,
            detector,
            limiter,
            identities,
            cancel,
        }
    }

    pub fn with_direct(mut self, transport: Arc<dyn Transport>) -> Self {
        self.direct = Some(transport);
        self
    }

    pub fn with_browser(mut self, transport: Arc<dyn Transport>) -> Self {
        self.browser = Some(transport);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn identities(&self) -> &Arc<IdentityRotator> {
        &self.identities
    }

    fn transport(&self, kind: TransportKind, url: &str) -> Result<Arc<dyn Transport>> {
        match kind {
            TransportKind::Direct => self.direct.clone().ok_or_else(|| HarvestError::NoTransport {
                url: url.to_string(),
            }),
            TransportKind::Browser => self.browser.clone().ok_or(HarvestError::BrowserUnavailable),
        }
    }

    /// One paced, classified attempt
    async fn attempt(
        &self,
        request: &FetchRequest,
        transport: &Arc<dyn Transport>,
    ) -> Result<FetchResult> {
        if self.cancel.is_cancelled() {
            return Err(HarvestError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(HarvestError::Cancelled),
            _ = self.limiter.acquire() => {}
        }

        let identity = self.identities.current();
        tracing::debug!(
            "[{}] {} fetch of {} as {}",
            request.client_id,
            transport.kind(),
            request.url,
            identity.tag()
        );

        let result = self.detector.label(transport.execute(request, &identity).await);
        if result.block_kind() != Some(BlockKind::Captcha) {
            transport.release(request).await;
        }
        Ok(result)
    }

    /// Fetches one page, retrying and escalating until it is clean
    ///
    /// # Returns
    ///
    /// * `Ok(FetchResult)` - A clean result
    /// * `Err(HarvestError::Exhausted)` - Every allowed attempt failed
    /// * `Err(HarvestError::Cancelled)` - The harvest was cancelled
    /// * `Err(HarvestError::BrowserUnavailable)` - Browser-first without a browser
    pub async fn fetch(
        &self,
        request: &FetchRequest,
        captcha: &mut dyn CaptchaHandler,
    ) -> Result<FetchResult> {
        let mut state = RetryState::new(TransportKind::from(request.preference));

        loop {
            let n = state.attempt();
            let transport = self.transport(state.transport(), &request.url)?;
            let result = self.attempt(request, &transport).await?;
            state.record_attempt();

            match &result.outcome {
                FetchOutcome::Success => {
                    state.succeed();
                    self.identities.rotate();
                    return Ok(result);
                }
                FetchOutcome::Blocked(BlockKind::Captcha) => {
                    tracing::warn!(
                        "[{}] CAPTCHA on {} via {}",
                        request.client_id,
                        request.url,
                        transport.kind()
                    );
                    let recheck = EngineRecheck {
                        engine: self,
                        request,
                        transport: Arc::clone(&transport),
                    };
                    let resolution = captcha
                        .on_captcha(
                            &result,
                            &recheck,
                            self.settings.captcha_poll_interval,
                            &self.cancel,
                        )
                        .await;
                    transport.release(request).await;

                    match resolution? {
                        Some(cleared) if cleared.is_success() => {
                            state.succeed();
                            self.identities.rotate();
                            return Ok(cleared);
                        }
                        _ => continue,
                    }
                }
                FetchOutcome::Blocked(BlockKind::Defensive) | FetchOutcome::TransportError(_) => {
                    state.record_error(result.describe_failure());
                }
            }

            if n < self.settings.max_retries {
                let delay = self.settings.backoff_delay(n);
                tracing::warn!(
                    "[{}] {} attempt {} for {} failed ({}); retrying in {:.1}s",
                    request.client_id,
                    transport.kind(),
                    n + 1,
                    request.url,
                    result.describe_failure(),
                    delay.as_secs_f64()
                );
                state.begin_backoff(delay);
                sleep_or_cancel(delay, &self.cancel).await?;
                state.next_attempt();
                continue;
            }

            let defensive = result.block_kind() == Some(BlockKind::Defensive);
            if defensive
                && state.transport() == TransportKind::Direct
                && self.browser.is_some()
                && state.escalate(TransportKind::Browser)
            {
                tracing::info!(
                    "[{}] Escalating {} to the browser transport",
                    request.client_id,
                    request.url
                );
                continue;
            }

            state.exhaust();
            let last_error = state
                .last_error()
                .unwrap_or("unknown failure")
                .to_string();
            tracing::warn!(
                "[{}] Giving up on {} after {} attempts: {}",
                request.client_id,
                request.url,
                state.attempts_made(),
                last_error
            );
            return Err(HarvestError::Exhausted {
                url: request.url.clone(),
                attempts: state.attempts_made(),
                last_error,
            });
        }
    }
}

struct EngineRecheck<'a> {
    engine: &'a FetchEngine,
    request: &'a FetchRequest,
    transport: Arc<dyn Transport>,
}

#[async_trait]
impl PageRecheck for EngineRecheck<'_> {
    async fn recheck(&self) -> Result<FetchResult> {
        if self.engine.cancel.is_cancelled() {
            return Err(HarvestError::Cancelled);
        }

        match self.transport.recheck(self.request).await {
            Some(result) => Ok(self.engine.detector.label(result)),
            None => self.engine.attempt(self.request, &self.transport).await,
        }
    }
}
