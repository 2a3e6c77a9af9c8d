//! Direct HTTP transport
//!
//! This module handles plain HTTP requests, including:
//! - Building HTTP clients (one per proxy, reused across requests)
//! - Applying the identity's fingerprint headers and the request's extra headers
//! - Per-request deadlines
//! - Mapping client failures to transport errors

use crate::fetch::{FetchRequest, FetchResult, Transport, TransportKind};
use crate::identity::ClientIdentity;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, Proxy};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Fetches pages with `reqwest`
#[derive(Debug, Default)]
pub struct DirectTransport {
    clients: Mutex<HashMap<Option<String>, Client>>,
}

impl DirectTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached client for a proxy, building it on first use
    fn client_for(&self, proxy: Option<&str>) -> Result<Client, reqwest::Error> {
        let key = proxy.map(str::to_string);
        let mut clients = match self.clients.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let client = build_http_client(proxy)?;
        clients.insert(key, client.clone());
        Ok(client)
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `proxy` - Optional proxy every request of this client leaves through
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Invalid proxy or TLS backend failure
pub fn build_http_client(proxy: Option<&str>) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = proxy {
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    builder.build()
}

fn describe_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else if e.is_body() || e.is_decode() {
        format!("failed to read response body: {}", e)
    } else {
        e.to_string()
    }
}

#[async_trait]
impl Transport for DirectTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Direct
    }

    async fn execute(&self, request: &FetchRequest, identity: &ClientIdentity) -> FetchResult {
        let start = Instant::now();

        let client = match self.client_for(identity.proxy.as_deref()) {
            Ok(client) => client,
            Err(e) => {
                return FetchResult::transport_error(
                    &request.url,
                    format!("failed to build HTTP client: {}", e),
                    start.elapsed(),
                    TransportKind::Direct,
                )
            }
        };

        let mut builder = client.get(&request.url).timeout(request.timeout);
        for (name, value) in identity.profile.headers() {
            if name != "User-Agent" {
                builder = builder.header(name, value);
            }
        }
        builder = builder.header(reqwest::header::USER_AGENT, &identity.user_agent);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("Direct fetch of {} failed: {}", request.url, e);
                return FetchResult::transport_error(
                    &request.url,
                    describe_error(&e),
                    start.elapsed(),
                    TransportKind::Direct,
                );
            }
        };

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        match response.text().await {
            Ok(body) => FetchResult::completed(
                final_url,
                status,
                body,
                start.elapsed(),
                TransportKind::Direct,
            ),
            Err(e) => FetchResult::transport_error(
                &request.url,
                describe_error(&e),
                start.elapsed(),
                TransportKind::Direct,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchOutcome;
    use crate::identity::IdentityRotator;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(None).is_ok());
        assert!(build_http_client(Some("http://127.0.0.1:8080")).is_ok());
    }

    #[test]
    fn test_client_cached_per_proxy() {
        let transport = DirectTransport::new();
        transport.client_for(None).unwrap();
        transport.client_for(None).unwrap();
        transport.client_for(Some("http://127.0.0.1:8080")).unwrap();
        assert_eq!(transport.clients.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_success_carries_status_and_body() {
        let server = MockServer::start().await;
        let identity = IdentityRotator::with_profile(false, None, "firefox-windows").current();

        Mock::given(method("GET"))
            .and(path("/search"))
            .and(header("user-agent", identity.user_agent.as_str()))
            .and(header("sec-fetch-mode", "navigate"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>results</html>"))
            .mount(&server)
            .await;

        let request = FetchRequest::new(format!("{}/search", server.uri()), "test");
        let result = DirectTransport::new().execute(&request, &identity).await;

        assert_eq!(result.outcome, FetchOutcome::Success);
        assert_eq!(result.status, Some(200));
        assert_eq!(result.body, "<html>results</html>");
        assert_eq!(result.transport, TransportKind::Direct);
    }

    #[tokio::test]
    async fn test_result_url_follows_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/listing/first"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/listing/first"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>landed</html>"))
            .mount(&server)
            .await;

        let identity = IdentityRotator::new(false, None).current();
        let request = FetchRequest::new(format!("{}/start", server.uri()), "test");
        let result = DirectTransport::new().execute(&request, &identity).await;

        assert_eq!(result.status, Some(200));
        assert_eq!(result.body, "<html>landed</html>");
        assert_eq!(result.url, format!("{}/listing/first", server.uri()));
    }

    #[tokio::test]
    async fn test_error_status_is_not_a_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let identity = IdentityRotator::new(false, None).current();
        let request = FetchRequest::new(server.uri(), "test");
        let result = DirectTransport::new().execute(&request, &identity).await;

        assert_eq!(result.outcome, FetchOutcome::Success);
        assert_eq!(result.status, Some(429));
    }

    #[tokio::test]
    async fn test_extra_headers_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("referer", "https://www.google.com/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let identity = IdentityRotator::new(false, None).current();
        let request =
            FetchRequest::new(server.uri(), "test").with_header("Referer", "https://www.google.com/");
        let result = DirectTransport::new().execute(&request, &identity).await;

        assert_eq!(result.status, Some(200));
    }

    #[tokio::test]
    async fn test_timeout_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let identity = IdentityRotator::new(false, None).current();
        let request =
            FetchRequest::new(server.uri(), "test").with_timeout(Duration::from_millis(200));
        let result = DirectTransport::new().execute(&request, &identity).await;

        assert!(matches!(result.outcome, FetchOutcome::TransportError(_)));
        assert_eq!(result.status, None);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let identity = IdentityRotator::new(false, None).current();
        let request = FetchRequest::new("http://127.0.0.1:9/", "test")
            .with_timeout(Duration::from_secs(2));
        let result = DirectTransport::new().execute(&request, &identity).await;

        assert!(matches!(result.outcome, FetchOutcome::TransportError(_)));
    }
}
