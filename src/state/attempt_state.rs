//! Retry state of one logical fetch
//!
//! `RetryState` is created when a fetch starts and dropped when it returns.
//! It is never shared between fetches.

use crate::fetch::TransportKind;
use std::fmt;
use std::time::Duration;

/// Where a logical fetch currently is in its retry cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    /// About to make attempt `n` (0-based) on the active transport
    Attempting(u32),
    /// Sleeping after failed attempt `n`
    Backoff(u32),
    Succeeded,
    Exhausted,
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Exhausted)
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attempting(n) => write!(f, "attempting({})", n),
            Self::Backoff(n) => write!(f, "backoff({})", n),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Attempt bookkeeping for a single logical fetch
#[derive(Debug, Clone)]
pub struct RetryState {
    state: AttemptState,
    transport: TransportKind,
    escalated: bool,
    attempts_made: u32,
    last_error: Option<String>,
    accumulated_backoff: Duration,
}

impl RetryState {
    /// Starts at `Attempting(0)` on the given transport
    pub fn new(transport: TransportKind) -> Self {
        Self {
            state: AttemptState::Attempting(0),
            transport,
            escalated: false,
            attempts_made: 0,
            last_error: None,
            accumulated_backoff: Duration::ZERO,
        }
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    /// Attempt number on the active transport
    pub fn attempt(&self) -> u32 {
        match self.state {
            AttemptState::Attempting(n) | AttemptState::Backoff(n) => n,
            AttemptState::Succeeded | AttemptState::Exhausted => 0,
        }
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    pub fn has_escalated(&self) -> bool {
        self.escalated
    }

    /// Total attempts made across all transports
    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn accumulated_backoff(&self) -> Duration {
        self.accumulated_backoff
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn record_attempt(&mut self) {
        self.attempts_made += 1;
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    /// `Attempting(n)` → `Backoff(n)`
    pub fn begin_backoff(&mut self, delay: Duration) {
        if let AttemptState::Attempting(n) = self.state {
            self.state = AttemptState::Backoff(n);
            self.accumulated_backoff += delay;
        }
    }

    /// `Backoff(n)` → `Attempting(n + 1)`
    pub fn next_attempt(&mut self) {
        if let AttemptState::Backoff(n) = self.state {
            self.state = AttemptState::Attempting(n + 1);
        }
    }

    /// Switches to another transport and restarts the attempt counter
    ///
    /// Only the first escalation of a fetch takes effect.
    pub fn escalate(&mut self, transport: TransportKind) -> bool {
        if self.escalated || self.is_terminal() {
            return false;
        }
        self.escalated = true;
        self.transport = transport;
        self.state = AttemptState::Attempting(0);
        true
    }

    pub fn succeed(&mut self) {
        self.state = AttemptState::Succeeded;
    }

    pub fn exhaust(&mut self) {
        self.state = AttemptState::Exhausted;
    }
}
