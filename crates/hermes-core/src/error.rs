//! Error types for Hermes core.
//!
//! Hostile or malformed input on the loopback boundary is an expected
//! condition, so decoding reports it as a [`CodecError`] value instead of
//! panicking. Engine failures are reported as [`EngineError`].

use thiserror::Error;

/// Result type alias using [`CodecError`].
pub type CodecResult<T> = Result<T, CodecError>;

/// Result type alias using [`EngineError`].
pub type EngineResult<T> = Result<T, EngineError>;

/// Reasons a request body could not be turned into a payload.
///
/// Every variant maps to `400 Bad Request`; no partially decoded value is
/// ever returned alongside an error.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The body is not syntactically valid JSON (or is truncated).
    #[error("malformed JSON: {message}")]
    Malformed {
        /// Parser message.
        message: String,
    },

    /// The body is JSON but does not match the closed schema. Unknown members,
    /// including type hints such as `$type`, end up here.
    #[error("payload does not match schema: {message}")]
    Schema {
        /// Binder message.
        message: String,
    },

    /// `FileUris` was missing or empty.
    #[error("FileUris must contain at least one entry")]
    EmptyFileUris,

    /// The declared charset is not UTF-8.
    #[error("unsupported charset: {charset}")]
    UnsupportedCharset {
        /// Charset named in the `Content-Type` header.
        charset: String,
    },

    /// A response could not be serialized.
    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),
}

impl CodecError {
    /// Returns a short category label for logs and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Malformed { .. } => "malformed",
            Self::Schema { .. } => "schema",
            Self::EmptyFileUris => "empty_file_uris",
            Self::UnsupportedCharset { .. } => "charset",
            Self::Encode(_) => "encode",
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        use serde_json::error::Category;

        match err.classify() {
            Category::Data => Self::Schema {
                message: err.to_string(),
            },
            Category::Io | Category::Syntax | Category::Eof => Self::Malformed {
                message: err.to_string(),
            },
        }
    }
}

/// Failures reported by an [`AnalysisEngine`](crate::AnalysisEngine).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The engine has not finished loading.
    #[error("analysis engine is not ready")]
    NotReady,

    /// The engine observed its cancellation token and stopped.
    #[error("analysis was cancelled")]
    Cancelled,

    /// The engine failed while analyzing.
    #[error("analysis failed: {message}")]
    Failed {
        /// Engine-provided detail.
        message: String,
    },
}

impl EngineError {
    /// Creates a [`EngineError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}
