use crate::fetch::{FetchRequest, FetchResult, TransportKind};
use crate::identity::ClientIdentity;
use async_trait::async_trait;

/// A way of retrieving a page
///
/// Implementations never fail: problems reaching the server come back as a
/// `FetchOutcome::TransportError` inside the result, and every completed
/// response comes back as `FetchOutcome::Success` with its status. Deciding
/// whether a response is a block is left to the detector.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    async fn execute(&self, request: &FetchRequest, identity: &ClientIdentity) -> FetchResult;

    /// Reads the page the last `execute` for this request's client left open
    ///
    /// Returns `None` when nothing was left open; the page then has to be
    /// fetched again.
    async fn recheck(&self, _request: &FetchRequest) -> Option<FetchResult> {
        None
    }

    /// Closes whatever the last `execute` for this request's client left open
    async fn release(&self, _request: &FetchRequest) {}
}
