//! State module for tracking harvest progress
//!
//! # Components
//!
//! - `AttemptState` / `RetryState`: where a single logical fetch is in its retry cycle
//! - `HarvestStatus`: lifecycle status of a query, persisted with its checkpoint

mod attempt_state;
mod harvest_status;

// Re-export main types
pub use attempt_state::{AttemptState, RetryState};
pub use harvest_status::HarvestStatus;
