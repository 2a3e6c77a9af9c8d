//! Browser transport
//!
//! Pages are rendered by a real browser reached over the DevTools protocol.
//! The browser is expected to be already running (and signed in, where the
//! target needs it); `CdpSession` attaches to it through its debugging
//! endpoint and never closes it.
//!
//! `BrowserTransport` only talks to the `BrowserSession` / `PageHandle`
//! traits, so it can be driven by a scripted session in tests.

use crate::config::{BrowserConfig, SettleMode};
use crate::fetch::{FetchRequest, FetchResult, Transport, TransportKind};
use crate::identity::ClientIdentity;
use crate::{HarvestError, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Script run in every new document before the page's own scripts
pub const STEALTH_INIT_SCRIPT: &str = r#"
(() => {
    try {
        Object.defineProperty(Navigator.prototype, 'webdriver', {
            get: () => undefined,
            configurable: true,
        });
    } catch (e) {}

    try {
        Object.defineProperty(Navigator.prototype, 'languages', {
            get: () => ['en-US', 'en'],
            configurable: true,
        });
    } catch (e) {}

    try {
        Object.defineProperty(Navigator.prototype, 'plugins', {
            get: () => [1, 2, 3, 4, 5],
            configurable: true,
        });
    } catch (e) {}

    if (!window.chrome) {
        window.chrome = {};
    }
    if (!window.chrome.runtime) {
        window.chrome.runtime = {};
    }

    try {
        const originalQuery = window.navigator.permissions.query;
        window.navigator.permissions.query = (parameters) =>
            parameters.name === 'notifications'
                ? Promise.resolve({ state: Notification.permission })
                : originalQuery(parameters);
    } catch (e) {}
})();
"#;

/// Status and rendered document of a navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    pub status: u16,
    pub body: String,
    /// Address of the document after redirects, when the browser reports it
    pub final_url: Option<String>,
}

/// Source of fresh pages in a running browser
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn PageHandle>>;
}

/// One browser tab
#[async_trait]
pub trait PageHandle: Send {
    /// Applies the identity (user agent, viewport) and init script before navigation
    async fn prepare(&mut self, identity: &ClientIdentity, init_script: &str) -> Result<()>;

    /// Navigates and waits for the page to settle
    ///
    /// Fails when no document response arrives.
    async fn navigate(&mut self, url: &str, settle: SettleMode) -> Result<PageResponse>;

    /// Reads the tab's current document without navigating
    async fn current_document(&mut self) -> Result<PageResponse>;

    async fn close(self: Box<Self>);
}

/// Fetches pages by rendering them in a browser session
///
/// The tab used for a request stays open, keyed by the request's client,
/// until `release` is called or the same client fetches again. A tab showing
/// a CAPTCHA is where the operator solves it, and `recheck` re-reads it.
pub struct BrowserTransport {
    session: Arc<dyn BrowserSession>,
    settle: SettleMode,
    /// Page creation, navigation and reads are serialized per session
    gate: Mutex<()>,
    open: Mutex<HashMap<String, Box<dyn PageHandle>>>,
}

impl BrowserTransport {
    pub fn new(session: Arc<dyn BrowserSession>, settle: SettleMode) -> Self {
        Self {
            session,
            settle,
            gate: Mutex::new(()),
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Opens and prepares a tab and navigates it; the tab is closed on failure
    async fn render(
        &self,
        request: &FetchRequest,
        identity: &ClientIdentity,
    ) -> Result<(PageResponse, Box<dyn PageHandle>)> {
        let mut page = self.session.new_page().await?;

        let outcome = match page.prepare(identity, STEALTH_INIT_SCRIPT).await {
            Ok(()) => {
                let navigation = page.navigate(&request.url, self.settle);
                match tokio::time::timeout(request.timeout, navigation).await {
                    Ok(response) => response,
                    Err(_) => Err(HarvestError::Browser(format!(
                        "navigation timed out after {:?}",
                        request.timeout
                    ))),
                }
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(response) => Ok((response, page)),
            Err(e) => {
                page.close().await;
                Err(e)
            }
        }
    }

    fn to_result(request: &FetchRequest, response: PageResponse, start: Instant) -> FetchResult {
        let url = response.final_url.unwrap_or_else(|| request.url.clone());
        FetchResult::completed(
            url,
            response.status,
            response.body,
            start.elapsed(),
            TransportKind::Browser,
        )
    }

    fn to_error(request: &FetchRequest, error: HarvestError, start: Instant) -> FetchResult {
        tracing::debug!("Browser fetch of {} failed: {}", request.url, error);
        FetchResult::transport_error(
            &request.url,
            error.to_string(),
            start.elapsed(),
            TransportKind::Browser,
        )
    }
}

#[async_trait]
impl Transport for BrowserTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Browser
    }

    async fn execute(&self, request: &FetchRequest, identity: &ClientIdentity) -> FetchResult {
        let _guard = self.gate.lock().await;
        let start = Instant::now();

        let previous = self.open.lock().await.remove(&request.client_id);
        if let Some(page) = previous {
            page.close().await;
        }

        match self.render(request, identity).await {
            Ok((response, page)) => {
                self.open.lock().await.insert(request.client_id.clone(), page);
                Self::to_result(request, response, start)
            }
            Err(e) => Self::to_error(request, e, start),
        }
    }

    async fn recheck(&self, request: &FetchRequest) -> Option<FetchResult> {
        let _guard = self.gate.lock().await;
        let mut open = self.open.lock().await;
        let page = open.get_mut(&request.client_id)?;
        let start = Instant::now();

        let read = match tokio::time::timeout(request.timeout, page.current_document()).await {
            Ok(read) => read,
            Err(_) => Err(HarvestError::Browser(format!(
                "reading the page timed out after {:?}",
                request.timeout
            ))),
        };

        Some(match read {
            Ok(response) => Self::to_result(request, response, start),
            Err(e) => Self::to_error(request, e, start),
        })
    }

    async fn release(&self, request: &FetchRequest) {
        let _guard = self.gate.lock().await;
        let page = self.open.lock().await.remove(&request.client_id);
        if let Some(page) = page {
            page.close().await;
        }
    }
}

/// A DevTools connection to an already running browser
///
/// The connection lives as long as this value; dropping it stops the event
/// loop but leaves the browser itself running.
pub struct CdpSession {
    browser: Browser,
    handler: JoinHandle<()>,
    settle_timeout: Duration,
    quiet: Duration,
}

impl CdpSession {
    /// Attaches to the browser behind `config.debugging_url`
    pub async fn connect(config: &BrowserConfig) -> Result<Self> {
        let ws_url = discover_websocket_url(&config.debugging_url).await?;
        tracing::info!("Attaching to browser at {}", ws_url);

        let (browser, mut handler) = Browser::connect(ws_url)
            .await
            .map_err(|e| HarvestError::Browser(format!("Browser connect failed: {}", e)))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("DevTools handler error: {}", e);
                }
            }
        });

        Ok(Self {
            browser,
            handler,
            settle_timeout: Duration::from_millis(config.settle_timeout_ms),
            quiet: Duration::from_millis(config.quiet_ms),
        })
    }

    /// Detaches from the browser
    pub fn shutdown(self) {
        tracing::debug!("Detaching from browser");
        drop(self);
    }
}

impl Drop for CdpSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// Resolves the websocket endpoint from `{debugging_url}/json/version`
async fn discover_websocket_url(debugging_url: &str) -> Result<String> {
    let version_url = format!("{}/json/version", debugging_url.trim_end_matches('/'));
    let body = reqwest::get(&version_url).await?.text().await?;
    let json: serde_json::Value = serde_json::from_str(&body)?;

    json["webSocketDebuggerUrl"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            HarvestError::Browser(format!("No webSocketDebuggerUrl in {}", version_url))
        })
}

#[async_trait]
impl BrowserSession for CdpSession {
    async fn new_page(&self) -> Result<Box<dyn PageHandle>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| HarvestError::Browser(format!("Failed to create page: {}", e)))?;

        Ok(Box::new(CdpPage {
            page,
            settle_timeout: self.settle_timeout,
            quiet: self.quiet,
        }))
    }
}

struct CdpPage {
    page: Page,
    settle_timeout: Duration,
    quiet: Duration,
}

impl CdpPage {
    /// Waits until the document is complete and no new resources load for `quiet`
    async fn wait_for_network_idle(&self) {
        let js = format!(
            r#"(async () => {{
                const timeoutMs = {timeout};
                const idleMs = {quiet};
                const interval = 250;
                const start = Date.now();
                let lastCount = performance.getEntriesByType('resource').length;
                let stableMs = 0;
                while (Date.now() - start < timeoutMs) {{
                    await new Promise(r => setTimeout(r, interval));
                    const count = performance.getEntriesByType('resource').length;
                    if (document.readyState === 'complete' && count === lastCount) {{
                        stableMs += interval;
                        if (stableMs >= idleMs) return true;
                    }} else {{
                        stableMs = 0;
                    }}
                    lastCount = count;
                }}
                return false;
            }})()"#,
            timeout = self.settle_timeout.as_millis(),
            quiet = self.quiet.as_millis(),
        );

        match self.page.evaluate(js).await {
            Ok(value) => {
                if !value.into_value::<bool>().unwrap_or(false) {
                    tracing::debug!("Network never went idle; continuing with current document");
                }
            }
            Err(e) => tracing::debug!("Network idle wait failed: {}", e),
        }
    }

    /// HTTP status of the main document, from the Navigation Timing entry
    async fn document_status(&self) -> u16 {
        let js = r#"(() => {
            const entry = performance.getEntriesByType('navigation')[0];
            return entry && entry.responseStatus ? entry.responseStatus : 0;
        })()"#;

        match self.page.evaluate(js.to_string()).await {
            Ok(value) => match value.into_value::<u16>() {
                Ok(status) if status > 0 => status,
                _ => 200,
            },
            Err(_) => 200,
        }
    }

    async fn read_document(&self) -> Result<PageResponse> {
        let status = self.document_status().await;
        let body = self
            .page
            .content()
            .await
            .map_err(|e| HarvestError::Browser(format!("Failed to read document: {}", e)))?;
        let final_url = self.page.url().await.ok().flatten();

        Ok(PageResponse {
            status,
            body,
            final_url,
        })
    }
}

#[async_trait]
impl PageHandle for CdpPage {
    async fn prepare(&mut self, identity: &ClientIdentity, init_script: &str) -> Result<()> {
        self.page
            .execute(SetUserAgentOverrideParams::new(identity.user_agent.clone()))
            .await
            .map_err(|e| HarvestError::Browser(format!("Failed to set user agent: {}", e)))?;

        let (width, height) = identity.viewport();
        self.page
            .execute(SetDeviceMetricsOverrideParams::new(
                i64::from(width),
                i64::from(height),
                1.0,
                false,
            ))
            .await
            .map_err(|e| HarvestError::Browser(format!("Failed to set viewport: {}", e)))?;

        self.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(
                init_script.to_string(),
            ))
            .await
            .map_err(|e| HarvestError::Browser(format!("Failed to inject init script: {}", e)))?;

        Ok(())
    }

    async fn navigate(&mut self, url: &str, settle: SettleMode) -> Result<PageResponse> {
        self.page
            .goto(url)
            .await
            .map_err(|e| HarvestError::Browser(format!("Navigation failed: {}", e)))?;

        if settle == SettleMode::NetworkIdle {
            self.wait_for_network_idle().await;
        }

        self.read_document().await
    }

    async fn current_document(&mut self) -> Result<PageResponse> {
        self.read_document().await
    }

    async fn close(self: Box<Self>) {
        if let Err(e) = self.page.close().await {
            tracing::debug!("Failed to close page: {}", e);
        }
    }
}
