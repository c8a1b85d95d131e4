//! Dynamic Cache Error Hierarchy
//!
//! Errors are split by the layer that produces them: the remote source
//! (list/watch calls), the cache lifecycle, and the process infrastructure
//! around it.

use std::time::Duration;

use config::ConfigError;

use crate::ResourceType;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (io, serialization, signals)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration loading failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration validation failures
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Watch lifecycle failures surfaced to callers
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Remote list/watch failures
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Malformed `group/version/resource` string
    #[error("Invalid resource type `{0}`: expected group/version/resource or version/resource")]
    InvalidResourceType(String),

    /// Malformed label selector
    #[error("Invalid label selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The resource type was quarantined after its watch failed
    #[error("unable to get Lister for {0}, watcher was unable to start")]
    Unavailable(ResourceType),

    /// The watch stream for a resource type could not be maintained
    #[error("watch for {resource} failed: {source}")]
    TransportFailure {
        resource: ResourceType,
        #[source]
        source: SourceError,
    },

    /// A watch was cancelled, or the deadline passed, before initial sync
    #[error("initial sync did not complete within {0:?}")]
    SyncTimeout(Duration),

    /// The cache has been shut down and no longer starts watches
    #[error("dynamic cache is shut down")]
    ShutDown,
}

/// Errors returned by a [`crate::ListWatch`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The remote source rejected the request
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The remote source does not serve this resource type
    #[error("the server could not find the requested resource: {0}")]
    NotFound(String),

    /// The requested resource version is no longer available
    #[error("too old resource version: {0}")]
    Expired(String),

    /// The remote source could not be reached
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// A list call did not complete in time
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The response could not be decoded
    #[error("invalid response: {0}")]
    Invalid(String),
}

impl SourceError {
    /// Whether a reflector should back off and retry instead of giving up.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SourceError::Unavailable(_) | SourceError::Timeout(_) | SourceError::Expired(_)
        )
    }

    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            SourceError::Forbidden(_) => "forbidden",
            SourceError::NotFound(_) => "not_found",
            SourceError::Expired(_) => "expired",
            SourceError::Unavailable(_) => "unavailable",
            SourceError::Timeout(_) => "timeout",
            SourceError::Invalid(_) => "invalid",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    SignalSenderClosed(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::System(SystemError::Io(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::System(SystemError::Json(e))
    }
}
