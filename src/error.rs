//! Error types for cube-odds.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! the failing layer (upstream fetch, live results, worker orchestration)
//! and surface a readable message.

use thiserror::Error;
use chrono::{DateTime, Utc};

/// Validation errors that occur during input validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Competitor list cannot be empty")]
    EmptyCompetitorList,

    #[error("Unsupported event '{event}'")]
    UnsupportedEvent {
        event: String,
    },

    #[error("Window start ({start}) must be before now")]
    WindowStartNotInPast {
        start: DateTime<Utc>,
    },

    #[error("Invalid window: start ({start}) must be before end ({end})")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Inputted times must have {expected_rows} rows of {expected_columns} attempts, got {reason}")]
    InputtedTimesShape {
        expected_rows: usize,
        expected_columns: usize,
        reason: String,
    },

    #[error("Invalid distribution parameters: {reason}")]
    InvalidDistribution {
        reason: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Errors raised while talking to an upstream data provider.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request to {url} failed: {message}")]
    Network {
        url: String,
        message: String,
    },

    #[error("Request to {url} returned HTTP {status}")]
    Status {
        url: String,
        status: u16,
    },

    #[error("Malformed payload from {url}: {message}")]
    Parse {
        url: String,
        message: String,
    },

    #[error("Failed to access {path}: {message}")]
    Io {
        path: String,
        message: String,
    },
}

impl FetchError {
    /// Returns true if the failure happened at the transport level.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Status { .. })
    }

    /// Returns true if the upstream answered with an unreadable payload.
    #[must_use]
    pub const fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}

/// Errors specific to live round resolution.
#[derive(Debug, Error)]
pub enum LiveResultsError {
    #[error("Unable to resolve live id for competition '{competition_id}': {reason}")]
    Resolution {
        competition_id: String,
        reason: String,
    },

    #[error("Event '{event}' not found or has no rounds in competition '{competition_id}'")]
    NotFound {
        competition_id: String,
        event: String,
    },

    #[error("Live results data error: {reason}")]
    Data {
        reason: String,
    },
}

/// Errors raised by the simulation orchestrator and its worker.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Failed to initialize simulation engine: {message}")]
    Init {
        message: String,
    },

    #[error("Failed to load competition data: {message}")]
    Load {
        message: String,
    },

    #[error("Simulation run failed: {message}")]
    Run {
        message: String,
    },

    #[error("Data not loaded; run an initial simulation first")]
    NotLoaded,

    #[error("A simulation request is already in flight")]
    Busy,

    #[error("Simulation worker has been terminated")]
    Terminated,

    #[error("Simulation worker disconnected")]
    Disconnected,
}

/// Top-level error type for cube-odds.
///
/// This enum encompasses all possible errors that can occur
/// when using the crate.
#[derive(Debug, Error)]
pub enum OddsError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Live results error: {0}")]
    LiveResults(#[from] LiveResultsError),

    #[error("Orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl OddsError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an upstream fetch error.
    #[must_use]
    pub const fn is_fetch(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }

    /// Returns true if this is a live results error.
    #[must_use]
    pub const fn is_live_results(&self) -> bool {
        matches!(self, Self::LiveResults(_))
    }

    /// Returns true if this is an orchestrator error.
    #[must_use]
    pub const fn is_orchestrator(&self) -> bool {
        matches!(self, Self::Orchestrator(_))
    }

    /// Returns true if retrying the same request could succeed.
    ///
    /// Nothing in this crate retries automatically; this is a hint for callers.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(e) => match e {
                FetchError::Network { .. } => true,
                FetchError::Status { status, .. } => *status >= 500,
                _ => false,
            },
            Self::Orchestrator(e) => matches!(e, OrchestratorError::Busy),
            _ => false,
        }
    }
}

/// Result type alias for cube-odds operations.
pub type OddsResult<T> = Result<T, OddsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_window() {
        let now = Utc::now();
        let err = ValidationError::WindowStartNotInPast { start: now };
        let msg = format!("{err}");
        assert!(msg.contains("must be before now"));
    }

    #[test]
    fn test_inputted_times_shape_message() {
        let err = ValidationError::InputtedTimesShape {
            expected_rows: 3,
            expected_columns: 5,
            reason: "2 rows".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("3 rows of 5 attempts"));
        assert!(msg.contains("2 rows"));
    }

    #[test]
    fn test_fetch_error_classification() {
        let network = FetchError::Network {
            url: "https://example.invalid".to_string(),
            message: "refused".to_string(),
        };
        assert!(network.is_network());
        assert!(!network.is_parse());

        let parse = FetchError::Parse {
            url: "https://example.invalid".to_string(),
            message: "expected value".to_string(),
        };
        assert!(parse.is_parse());
        assert!(!parse.is_network());
    }

    #[test]
    fn test_live_results_not_found_message() {
        let err = LiveResultsError::NotFound {
            competition_id: "WC2025".to_string(),
            event: "333".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("'333'"));
        assert!(msg.contains("WC2025"));
    }

    #[test]
    fn test_odds_error_from_orchestrator() {
        let err: OddsError = OrchestratorError::NotLoaded.into();
        assert!(err.is_orchestrator());
        assert!(!err.is_retryable());
        assert!(format!("{err}").contains("Data not loaded"));
    }

    #[test]
    fn test_odds_error_retryable() {
        let err1: OddsError = ValidationError::EmptyCompetitorList.into();
        assert!(!err1.is_retryable());

        let err2: OddsError = FetchError::Status {
            url: "u".to_string(),
            status: 503,
        }
        .into();
        assert!(err2.is_retryable());

        let err3: OddsError = FetchError::Status {
            url: "u".to_string(),
            status: 404,
        }
        .into();
        assert!(!err3.is_retryable());

        let err4: OddsError = LiveResultsError::Data {
            reason: "missing format".to_string(),
        }
        .into();
        assert!(err4.is_live_results());
        assert!(!err4.is_retryable());
    }

    #[test]
    fn test_odds_error_internal() {
        let err = OddsError::internal("unexpected state");
        assert!(!err.is_retryable());
        assert!(format!("{err}").contains("unexpected state"));
    }
}
