//! # treeshard core
//!
//! Shared serving-side logic for treeshard: shard and result models, the
//! query language, the [`searcher::Searcher`] backend trait with an
//! in-memory sharded implementation, and the adaptive result
//! [`budget::Budgeter`].
//!
//! This crate performs no filesystem or network I/O. Loading shards from
//! disk and exposing search over HTTP live in the `treeshard` crate.

pub mod budget;
pub mod error;
pub mod models;
pub mod query;
pub mod searcher;

pub use budget::{BudgetedSearch, Budgeter, SearchBudget};
pub use error::{QueryError, SearchError};
pub use models::{FileMatch, LineMatch, SearchOptions, SearchResult, SearchStats, Shard};
pub use query::Query;
pub use searcher::{Searcher, ShardedSearcher};
