//! Search backend abstraction.
//!
//! The [`Searcher`] trait is the seam between query serving and whatever
//! holds the index. The [`Budgeter`](crate::budget::Budgeter) depends only
//! on this trait, so tests can substitute recording fakes and services can
//! swap in other backends.
//!
//! Implementations must be `Send + Sync`: one searcher instance is shared
//! read-only by all concurrent queries.

pub mod sharded;

use async_trait::async_trait;

use crate::error::SearchError;
use crate::models::{SearchOptions, SearchResult};
use crate::query::Query;

pub use sharded::ShardedSearcher;

/// A search backend over a sharded corpus.
#[async_trait]
pub trait Searcher: Send + Sync {
    /// Run `query` with the given options.
    ///
    /// With `estimate_doc_count` set, only `stats.shard_files_considered`
    /// is meaningful and `files` is empty. Exceeding `max_wall_time` must
    /// yield [`SearchError::Timeout`] rather than a silently partial result.
    async fn search(&self, query: &Query, opts: &SearchOptions)
        -> Result<SearchResult, SearchError>;
}
