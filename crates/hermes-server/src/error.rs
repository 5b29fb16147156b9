//! Error types for the Hermes server.

use std::fmt;
use std::io;

use http::StatusCode;
use thiserror::Error;

/// Errors surfaced by the server host and its configuration.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Every start attempt failed to bind. The server is now faulted.
    #[error("server faulted after {attempts} start attempts: {last_error}")]
    Faulted {
        /// Number of attempts made.
        attempts: u32,
        /// The bind failure of the last attempt.
        #[source]
        last_error: ListenerError,
    },

    /// `start` was called on a server that is not stopped.
    #[error("server has already been started")]
    AlreadyStarted,

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// `stop` ran before the listener came up. The bound socket was released.
    #[error("server was stopped while starting")]
    Stopped,
}

impl ServerError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns `true` if the error leaves the server unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Faulted { .. })
    }

    /// Get the error category for logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Faulted { .. } => "faulted",
            Self::AlreadyStarted => "already_started",
            Self::Config { .. } => "config",
            Self::Stopped => "stopped",
        }
    }
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Failures to bind a loopback listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Another socket already owns the port.
    #[error("address 127.0.0.1:{port} is already in use")]
    AddressInUse {
        /// Port that was requested.
        port: u16,
    },

    /// Any other bind failure.
    #[error("failed to bind 127.0.0.1:{port}: {source}")]
    Bind {
        /// Port that was requested.
        port: u16,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl ListenerError {
    /// Port the failed bind asked for.
    pub fn port(&self) -> u16 {
        match self {
            Self::AddressInUse { port } | Self::Bind { port, .. } => *port,
        }
    }

    /// Returns `true` for the "address in use" condition.
    pub fn is_address_in_use(&self) -> bool {
        matches!(self, Self::AddressInUse { .. })
    }
}

/// Ways a dispatched analysis can end without diagnostics.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// No concurrency slot freed up, or the engine did not answer, within the
    /// request timeout.
    #[error("analysis did not complete within the request timeout")]
    Timeout,

    /// The job was cancelled through `/cancel` or by shutdown.
    #[error("analysis was cancelled")]
    Cancelled,

    /// A job with the same id is already in flight.
    #[error("an analysis with this id is already in flight")]
    DuplicateAnalysisId,

    /// The engine is still loading.
    #[error("analysis engine is not ready")]
    EngineNotReady,

    /// The engine failed.
    #[error("analysis failed: {message}")]
    Engine {
        /// Engine-provided detail.
        message: String,
    },
}

impl DispatchError {
    /// Get the HTTP status code for this error.
    ///
    /// A cancelled job is answered normally, with no diagnostics.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Timeout => StatusCode::REQUEST_TIMEOUT,
            Self::Cancelled => StatusCode::OK,
            Self::DuplicateAnalysisId => StatusCode::BAD_REQUEST,
            Self::EngineNotReady => StatusCode::SERVICE_UNAVAILABLE,
            Self::Engine { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the outcome label for logs and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::DuplicateAnalysisId => "duplicate",
            Self::EngineNotReady => "not_ready",
            Self::Engine { .. } => "failed",
        }
    }

    /// Returns `true` if the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::EngineNotReady)
    }
}

/// Error response body.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    /// Error category.
    pub error: String,
    /// Human-readable message.
    pub message: String,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

impl From<&DispatchError> for ErrorResponse {
    fn from(err: &DispatchError) -> Self {
        Self::new(err.category(), err.to_string())
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.error, self.message)
    }
}
