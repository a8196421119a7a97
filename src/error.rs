//! Error types for the wikibot client core.

use thiserror::Error;

/// Top-level errors surfaced to callers of the library
#[derive(Debug, Error)]
pub enum WikiError {
    /// Invalid or unreadable configuration. Fatal to the call, never retried.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A site interface name that is not in the known-implementations table
    #[error("Invalid interface name '{0}'")]
    InvalidInterface(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Throttle error: {0}")]
    Throttle(#[from] ThrottleError),
}

impl WikiError {
    /// Whether this error belongs to the configuration class
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            WikiError::ConfigError(_) | WikiError::InvalidInterface(_)
        )
    }
}

impl From<config::ConfigError> for WikiError {
    fn from(err: config::ConfigError) -> Self {
        WikiError::ConfigError(err.to_string())
    }
}

/// Submission queue errors
///
/// Execution failures never reach the submitter directly; they are logged by the
/// worker and delivered only on the submission's completion channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Submission queue is closed: shutdown has been initiated")]
    Closed,

    #[error("Queued action '{label}' failed: {message}")]
    Execution { label: String, message: String },

    #[error("Queued action '{label}' panicked: {message}")]
    Panicked { label: String, message: String },

    #[error("Failed to start put-thread: {0}")]
    Spawn(String),

    #[error("Queued action '{0}' was dropped before it ran")]
    Dropped(String),
}

/// Errors raised while fetching pages of a paginated listing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Malformed page payload: {0}")]
    Malformed(String),

    #[error("Malformed pagination link: {0}")]
    Pagination(String),
}

/// Throttle log errors
#[derive(Debug, Error)]
pub enum ThrottleError {
    #[error("Throttle log I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt throttle log entry: {0}")]
    Corrupt(String),
}
