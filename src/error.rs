//! Resolution error types
//!
//! One taxonomy for every stage of the resolution chain. Errors are `Clone`
//! so a single in-flight resolution can hand the same outcome to every
//! caller waiting on it.

use std::path::PathBuf;

use thiserror::Error;

/// Why a network fetch failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkFailure {
    /// The request did not complete within the fetch timeout
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    /// The server answered with a non-success status code
    #[error("server returned status {0}")]
    Status(u16),

    /// Connection, TLS or body transfer error
    #[error("transport error: {0}")]
    Transport(String),
}

/// Why a local file was rejected as a document
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    /// File missing or unreadable
    #[error("file unreadable: {0}")]
    Unreadable(String),

    /// Payload is not a PDF (e.g. an HTML error page)
    #[error("payload is not a PDF document")]
    NotADocument,

    /// PDF header present but the trailer is missing
    #[error("document is truncated")]
    Truncated,

    /// Document opened but has no pages
    #[error("document has no pages")]
    ZeroPages,

    /// MuPDF could not open the document
    #[error("document could not be parsed: {0}")]
    Unparsable(String),
}

/// Unified resolution error type
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// Locator could not be turned into a valid URL
    #[error("cannot normalize locator {input:?}: {reason}")]
    Normalization { input: String, reason: String },

    /// Remote fetch failed
    #[error("fetch of {url} failed: {failure}")]
    Network { url: String, failure: NetworkFailure },

    /// File failed document validation (it has already been deleted)
    #[error("validation of {} failed: {failure}", path.display())]
    Validation {
        path: PathBuf,
        failure: ValidationFailure,
    },

    /// Disk write, move or read error in a cache tier
    #[error("storage error: {0}")]
    Storage(String),

    /// No tier hit and no usable locator
    #[error("document not found: {0}")]
    NotFound(String),

    /// Thumbnail could not be produced
    #[error("render error: {0}")]
    Render(String),

    /// Background task failure
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for resolution operations
pub type Result<T> = std::result::Result<T, ResolveError>;

impl ResolveError {
    pub(crate) fn normalization(input: &str, reason: impl Into<String>) -> Self {
        ResolveError::Normalization {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn validation(path: impl Into<PathBuf>, failure: ValidationFailure) -> Self {
        ResolveError::Validation {
            path: path.into(),
            failure,
        }
    }

    /// Whether the orchestrator should retry the same locator
    pub fn is_retryable(&self) -> bool {
        match self {
            ResolveError::Network { failure, .. } => match failure {
                NetworkFailure::Timeout(_) | NetworkFailure::Transport(_) => true,
                NetworkFailure::Status(code) => *code >= 500 || *code == 429,
            },
            _ => false,
        }
    }

    /// Short stable label, used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::Normalization { .. } => "normalization",
            ResolveError::Network { .. } => "network",
            ResolveError::Validation { .. } => "validation",
            ResolveError::Storage(_) => "storage",
            ResolveError::NotFound(_) => "not_found",
            ResolveError::Render(_) => "render",
            ResolveError::Internal(_) => "internal",
        }
    }
}

impl From<std::io::Error> for ResolveError {
    fn from(err: std::io::Error) -> Self {
        ResolveError::Storage(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ResolveError {
    fn from(err: tokio::task::JoinError) -> Self {
        ResolveError::Internal(format!("Task join error: {}", err))
    }
}
