use std::time::Duration;
use thiserror::Error;

use crate::query::ParseError;

/// Failure reported by a search backend.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The wall-clock limit expired before the scan completed.
    #[error("search timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },
    #[error("search backend failure: {0}")]
    Backend(String),
}

/// Failure of the query entry point. Never retried internally.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid query: {0}")]
    Parse(#[from] ParseError),
    #[error("requested result count must be at least 1")]
    InvalidCount,
    #[error("document count estimation failed: {0}")]
    Estimate(#[source] SearchError),
    #[error("search failed: {0}")]
    Search(#[source] SearchError),
}

impl QueryError {
    /// True when either search phase ran out of wall-clock time.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            QueryError::Estimate(SearchError::Timeout { .. })
                | QueryError::Search(SearchError::Timeout { .. })
        )
    }
}
