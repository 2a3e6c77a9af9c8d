//! Scripted transport for unit tests

use crate::fetch::{FetchRequest, FetchResult, Transport, TransportKind};
use crate::identity::ClientIdentity;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

pub const CAPTCHA_BODY: &str =
    r#"<html><form><div class="g-recaptcha" data-sitekey="6Lc"></div></form></html>"#;
pub const CLEAN_BODY: &str = "<html><body><p>results</p></body></html>";

/// One scripted response
#[derive(Debug, Clone)]
pub enum Scripted {
    Clean,
    Captcha,
    /// HTTP 429
    Defensive,
    Error,
    Body(String),
    /// A 200 whose final URL differs from the requested one: (final URL, body)
    Landed(String, String),
}

/// Replays a fixed sequence of responses, repeating the last one forever
pub struct ScriptedTransport {
    kind: TransportKind,
    script: Mutex<VecDeque<Scripted>>,
    last: Mutex<Scripted>,
    urls: Mutex<Vec<String>>,
    user_agents: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(kind: TransportKind, script: Vec<Scripted>) -> Self {
        let last = script.last().cloned().unwrap_or(Scripted::Error);
        Self {
            kind,
            script: Mutex::new(script.into()),
            last: Mutex::new(last),
            urls: Mutex::new(Vec::new()),
            user_agents: Mutex::new(Vec::new()),
        }
    }

    pub fn always(kind: TransportKind, response: Scripted) -> Self {
        Self::new(kind, vec![response])
    }

    pub fn calls(&self) -> usize {
        self.urls.lock().unwrap().len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    pub fn user_agents(&self) -> Vec<String> {
        self.user_agents.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn execute(&self, request: &FetchRequest, identity: &ClientIdentity) -> FetchResult {
        self.urls.lock().unwrap().push(request.url.clone());
        self.user_agents
            .lock()
            .unwrap()
            .push(identity.user_agent.clone());

        let next = {
            let mut script = self.script.lock().unwrap();
            match script.pop_front() {
                Some(next) => next,
                None => self.last.lock().unwrap().clone(),
            }
        };

        let elapsed = Duration::from_millis(10);
        match next {
            Scripted::Clean => {
                FetchResult::completed(&request.url, 200, CLEAN_BODY.to_string(), elapsed, self.kind)
            }
            Scripted::Captcha => FetchResult::completed(
                &request.url,
                200,
                CAPTCHA_BODY.to_string(),
                elapsed,
                self.kind,
            ),
            Scripted::Defensive => {
                FetchResult::completed(&request.url, 429, String::new(), elapsed, self.kind)
            }
            Scripted::Error => {
                FetchResult::transport_error(&request.url, "connection reset", elapsed, self.kind)
            }
            Scripted::Body(body) => FetchResult::completed(&request.url, 200, body, elapsed, self.kind),
            Scripted::Landed(url, body) => FetchResult::completed(url, 200, body, elapsed, self.kind),
        }
    }
}
