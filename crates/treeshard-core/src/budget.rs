//! Adaptive result budgeting for queries over a sharded corpus.
//!
//! # Algorithm
//!
//! 1. Run an estimate-only search scoped to the repository and read
//!    `num_docs` from `stats.shard_files_considered`.
//! 2. Derive a [`SearchBudget`]:
//!    - large corpus (`num_docs > 10000`): per-shard ceilings only,
//!      `n*5 + (5*n)/(num_docs/1000)` matches and
//!      `n/20 + n/(num_docs/500)` important matches;
//!    - otherwise every ceiling is `num_docs + n*100`, which is effectively
//!      unlimited for a corpus that small.
//! 3. Run the real search under a 10 second wall-clock limit and keep the
//!    first `n` files.
//!
//! All arithmetic is integer floor division. The large-corpus formulas are
//! only used when both divisors are non-zero.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::QueryError;
use crate::models::{SearchOptions, SearchResult};
use crate::query::Query;
use crate::searcher::Searcher;

/// Corpora with more eligible documents than this get per-shard ceilings.
pub const LARGE_CORPUS_THRESHOLD: usize = 10_000;

/// Wall-clock limit applied to the real search.
pub const MAX_WALL_TIME: Duration = Duration::from_secs(10);

/// Match-count ceilings for one query. `0` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchBudget {
    pub shard_max_match_count: usize,
    pub shard_max_important_match: usize,
    pub total_max_match_count: usize,
    pub total_max_important_match: usize,
}

impl SearchBudget {
    /// Compute the budget for `requested` results over `num_docs` documents.
    pub fn for_corpus(num_docs: usize, requested: usize) -> Self {
        if num_docs > LARGE_CORPUS_THRESHOLD {
            let per_thousand = num_docs / 1000;
            let per_five_hundred = num_docs / 500;
            let spread_matches = requested.saturating_mul(5).checked_div(per_thousand);
            let spread_important = requested.checked_div(per_five_hundred);

            if let (Some(spread_matches), Some(spread_important)) =
                (spread_matches, spread_important)
            {
                return Self {
                    shard_max_match_count: requested
                        .saturating_mul(5)
                        .saturating_add(spread_matches),
                    shard_max_important_match: requested / 20 + spread_important,
                    total_max_match_count: 0,
                    total_max_important_match: 0,
                };
            }
        }

        let n = num_docs.saturating_add(requested.saturating_mul(100));
        Self {
            shard_max_match_count: n,
            shard_max_important_match: n,
            total_max_match_count: n,
            total_max_important_match: n,
        }
    }

    /// True when only the per-shard ceilings are set.
    pub fn is_large_corpus(&self) -> bool {
        self.total_max_match_count == 0 && self.total_max_important_match == 0
    }

    /// Copy the ceilings into backend options.
    pub fn apply(&self, opts: &mut SearchOptions) {
        opts.shard_max_match_count = self.shard_max_match_count;
        opts.shard_max_important_match = self.shard_max_important_match;
        opts.total_max_match_count = self.total_max_match_count;
        opts.total_max_important_match = self.total_max_important_match;
    }
}

/// Outcome of a budgeted query.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetedSearch {
    /// Documents reported by the estimation phase.
    pub num_docs: usize,
    pub budget: SearchBudget,
    /// Backend result, truncated to the requested count.
    pub result: SearchResult,
}

/// Query entry point holding an injected search backend.
///
/// Construct one per service and share it; each call computes a fresh
/// budget, so concurrent queries never share mutable state.
pub struct Budgeter<S: ?Sized> {
    searcher: Arc<S>,
    max_wall_time: Duration,
}

impl<S: Searcher + ?Sized> Budgeter<S> {
    pub fn new(searcher: Arc<S>) -> Self {
        Self {
            searcher,
            max_wall_time: MAX_WALL_TIME,
        }
    }

    /// Override the wall-clock limit of the real search.
    pub fn with_max_wall_time(mut self, max_wall_time: Duration) -> Self {
        self.max_wall_time = max_wall_time;
        self
    }

    pub fn searcher(&self) -> &Arc<S> {
        &self.searcher
    }

    /// Parse `query` and run it with an adaptive budget.
    ///
    /// An empty `repo` means no repository scope.
    pub async fn search(
        &self,
        query: &str,
        num: usize,
        repo: &str,
    ) -> Result<BudgetedSearch, QueryError> {
        let parsed = Query::parse(query)?;
        self.search_query(&parsed, num, repo).await
    }

    /// Run an already parsed query with an adaptive budget.
    pub async fn search_query(
        &self,
        query: &Query,
        num: usize,
        repo: &str,
    ) -> Result<BudgetedSearch, QueryError> {
        if num == 0 {
            return Err(QueryError::InvalidCount);
        }
        let repo = (!repo.is_empty()).then(|| repo.to_string());

        let estimate_opts = SearchOptions {
            estimate_doc_count: true,
            repo: repo.clone(),
            ..Default::default()
        };
        let estimate = self
            .searcher
            .search(query, &estimate_opts)
            .await
            .map_err(QueryError::Estimate)?;
        let num_docs = estimate.stats.shard_files_considered;

        let budget = SearchBudget::for_corpus(num_docs, num);
        tracing::debug!(
            query = %query,
            num_docs,
            num,
            large_corpus = budget.is_large_corpus(),
            shard_max_match = budget.shard_max_match_count,
            shard_max_important = budget.shard_max_important_match,
            "computed search budget"
        );

        let mut opts = SearchOptions {
            repo,
            max_wall_time: Some(self.max_wall_time),
            ..Default::default()
        };
        budget.apply(&mut opts);

        let mut result = self
            .searcher
            .search(query, &opts)
            .await
            .map_err(QueryError::Search)?;
        result.files.truncate(num);

        Ok(BudgetedSearch {
            num_docs,
            budget,
            result,
        })
    }
}
