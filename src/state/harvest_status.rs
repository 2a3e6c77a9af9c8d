/// Harvest status definitions
///
/// A query's status is persisted with every checkpoint write so an operator
/// can tell a paused query from a finished or abandoned one.
use std::fmt;

/// Lifecycle status of one query's harvest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HarvestStatus {
    // ===== Active States =====
    /// Pages are being fetched
    Running,

    /// Waiting for an operator to solve a CAPTCHA
    Paused,

    // ===== Terminal States =====
    /// Pagination ended normally
    Completed,

    /// A page fetch ran out of retries on every transport
    Exhausted,

    /// The harvest was cancelled by the operator
    Cancelled,
}

impl HarvestStatus {
    /// Returns true if the query will make no further progress in this run
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running | Self::Paused)
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Exhausted => "exhausted",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "exhausted" => Some(Self::Exhausted),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns all statuses
    pub fn all_statuses() -> Vec<Self> {
        vec![
            Self::Running,
            Self::Paused,
            Self::Completed,
            Self::Exhausted,
            Self::Cancelled,
        ]
    }
}

impl fmt::Display for HarvestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
