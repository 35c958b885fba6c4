//! Error types for the pulse crate.

use thiserror::Error;

use crate::cycle::controller::RunState;

/// Result type for pulse operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or driving a poll cycle.
#[derive(Error, Debug)]
pub enum Error {
    /// The resource path is not a well-formed URL at tick time.
    #[error("invalid resource path '{path}': {source}")]
    InvalidPath {
        /// The offending path string.
        path: String,
        /// The underlying URL parse failure.
        source: url::ParseError,
    },

    /// A state transition was requested from the wrong run-state.
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        /// The operation that was attempted.
        action: &'static str,
        /// The run-state the controller was in.
        state: RunState,
    },

    /// The cycle's cancellation token fired while a tick was in flight.
    #[error("poll cycle cancelled")]
    Cancelled,

    /// Configuration error (profile parsing or validation).
    #[error("configuration error: {reason}")]
    Config {
        /// What was wrong with the configuration.
        reason: String,
    },

    /// HTTP error from reqwest (network failure or unparseable body).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an invalid-path error.
    pub fn invalid_path(path: impl Into<String>, source: url::ParseError) -> Self {
        Self::InvalidPath {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid-transition error.
    #[must_use]
    pub const fn invalid_transition(action: &'static str, state: RunState) -> Self {
        Self::InvalidTransition { action, state }
    }

    /// Create a config error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Whether this error is the normal termination path of an aborted cycle.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
