//! Error types for the ODA client
//!
//! Transport-level outcomes (retryable / fatal) are not errors on their own;
//! they are classified in [`crate::api::transport::TransportOutcome`] and only
//! surface here once the paginator has given up on them.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to callers of the client library
#[derive(Error, Debug)]
pub enum OdaError {
    /// Page size outside `1..=MAX_PAGE_SIZE`
    #[error("Invalid page size {requested}: must be between 1 and {max}")]
    InvalidPageSize { requested: u32, max: u32 },

    /// Query could not be built (empty entity name, etc.)
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A rendered request still contains a literal `$` parameter prefix
    #[error("Rendered query contains an unencoded '$' at byte {position}: {rendered}")]
    EncodingInvariantViolation { rendered: String, position: usize },

    /// Upstream fetch failed (fatal response, or retries exhausted)
    #[error("Fetch failed after {attempts} attempt(s): {reason}")]
    FetchFailed { reason: String, attempts: u32 },

    /// The overall deadline of a fetch elapsed
    #[error("Fetch exceeded its deadline of {deadline:?}")]
    Timeout { deadline: Duration },

    /// A fetch failed after some pages were already assembled; they were dropped
    #[error("Discarded {discarded} already fetched record(s): {source}")]
    PartialResultsDiscarded {
        discarded: usize,
        #[source]
        source: Box<OdaError>,
    },

    /// The on-disk cache could not be read or written
    #[error("Cache file {}: {reason}", path.display())]
    CacheFile { path: PathBuf, reason: String },

    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl OdaError {
    /// Shorthand for a failed fetch
    pub fn fetch_failed(reason: impl Into<String>, attempts: u32) -> Self {
        Self::FetchFailed {
            reason: reason.into(),
            attempts,
        }
    }

    /// True for `FetchFailed`, including one wrapped in `PartialResultsDiscarded`
    pub fn is_fetch_failed(&self) -> bool {
        match self {
            Self::FetchFailed { .. } => true,
            Self::PartialResultsDiscarded { source, .. } => source.is_fetch_failed(),
            _ => false,
        }
    }

    /// The upstream failure reason, if this error came from a failed fetch
    pub fn fetch_failure_reason(&self) -> Option<&str> {
        match self {
            Self::FetchFailed { reason, .. } => Some(reason),
            Self::PartialResultsDiscarded { source, .. } => source.fetch_failure_reason(),
            _ => None,
        }
    }
}

/// Convenience Result type for the client library
pub type Result<T> = std::result::Result<T, OdaError>;
