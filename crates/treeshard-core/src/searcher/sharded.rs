//! In-memory [`Searcher`] over a list of loaded shards.
//!
//! The shard list is an `Arc` snapshot behind `std::sync::RwLock`. A query
//! clones the snapshot and scans it on tokio's blocking pool, so a long scan
//! never stalls the async workers serving other requests. Reloads swap in a
//! new list without waiting for running queries.
//!
//! Per-shard ceilings stop the scan of one shard, total ceilings stop the
//! whole search. A ceiling of `0` is unlimited.

use std::cmp::Ordering;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use async_trait::async_trait;

use super::Searcher;
use crate::error::SearchError;
use crate::models::{FileMatch, LineMatch, SearchOptions, SearchResult, SearchStats, Shard};
use crate::query::{DocView, Query};

/// Score bonus for a file whose name matched a query atom.
const IMPORTANT_BOOST: f64 = 1000.0;

/// Searcher over shards held in memory.
pub struct ShardedSearcher {
    shards: RwLock<Arc<Vec<Shard>>>,
}

impl ShardedSearcher {
    pub fn new(shards: Vec<Shard>) -> Self {
        Self {
            shards: RwLock::new(Arc::new(shards)),
        }
    }

    /// Swap every shard of `repository` for `shards`, keeping other repositories.
    pub fn replace_repository(&self, repository: &str, shards: Vec<Shard>) -> Result<(), SearchError> {
        let mut guard = self
            .shards
            .write()
            .map_err(|_| SearchError::Backend("shard list lock poisoned".to_string()))?;
        let mut next: Vec<Shard> = guard
            .iter()
            .filter(|s| s.repository != repository)
            .cloned()
            .collect();
        next.extend(shards);
        *guard = Arc::new(next);
        Ok(())
    }

    pub fn shard_count(&self) -> usize {
        self.shards.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn document_count(&self) -> usize {
        self.shards
            .read()
            .map(|s| s.iter().map(|shard| shard.documents.len()).sum())
            .unwrap_or(0)
    }

    fn snapshot(&self) -> Result<Arc<Vec<Shard>>, SearchError> {
        self.shards
            .read()
            .map(|s| Arc::clone(&*s))
            .map_err(|_| SearchError::Backend("shard list lock poisoned".to_string()))
    }
}

fn search_shards(shards: &[Shard], query: &Query, opts: &SearchOptions) -> Result<SearchResult, SearchError> {
    let started = Instant::now();
    let deadline = opts.max_wall_time.map(|d| started + d);

    let atoms = query.positive_substrings();
    let repo_scope = opts.repo.as_deref().filter(|r| !r.is_empty());

    let mut stats = SearchStats::default();
    let mut files = Vec::new();

    'shards: for shard in shards {
        let in_scope = repo_scope.map_or(true, |r| shard.repository == r);
        if !in_scope || !query.could_match_repo(&shard.repository) {
            stats.shards_skipped += 1;
            continue;
        }

        if opts.estimate_doc_count {
            stats.shard_files_considered += shard.documents.len();
            continue;
        }

        stats.shards_scanned += 1;
        let mut shard_matches = 0usize;
        let mut shard_important = 0usize;

        for doc in &shard.documents {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(SearchError::Timeout {
                        elapsed: started.elapsed(),
                    });
                }
            }

            stats.shard_files_considered += 1;
            let view = DocView::new(&shard.repository, &doc.path, &doc.content);
            if !query.matches(&view) {
                continue;
            }

            let file_match = build_file_match(&shard.repository, &doc.path, &doc.content, &atoms);
            let matches = file_match.line_matches.len().max(1);
            shard_matches += matches;
            stats.match_count += matches;
            if file_match.important {
                shard_important += 1;
                stats.important_match_count += 1;
            }
            files.push(file_match);

            if reached(opts.total_max_match_count, stats.match_count)
                || reached(opts.total_max_important_match, stats.important_match_count)
            {
                stats.limit_hit = true;
                break 'shards;
            }
            if reached(opts.shard_max_match_count, shard_matches)
                || reached(opts.shard_max_important_match, shard_important)
            {
                stats.shards_truncated += 1;
                break;
            }
        }
    }

    files.sort_by(compare_matches);

    tracing::debug!(
        considered = stats.shard_files_considered,
        matches = stats.match_count,
        files = files.len(),
        estimate = opts.estimate_doc_count,
        "search finished"
    );

    Ok(SearchResult { files, stats })
}

impl Default for ShardedSearcher {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl Searcher for ShardedSearcher {
    async fn search(&self, query: &Query, opts: &SearchOptions) -> Result<SearchResult, SearchError> {
        let shards = self.snapshot()?;
        let query = query.clone();
        let opts = opts.clone();
        tokio::task::spawn_blocking(move || search_shards(&shards, &query, &opts))
            .await
            .map_err(|e| SearchError::Backend(format!("search task failed: {}", e)))?
    }
}

fn reached(limit: usize, count: usize) -> bool {
    limit > 0 && count >= limit
}

fn build_file_match(repository: &str, path: &str, content: &str, atoms: &[&Query]) -> FileMatch {
    let content_atoms: Vec<&Query> = atoms
        .iter()
        .copied()
        .filter(|q| matches!(q, Query::Substring { file_name: false, .. }))
        .collect();

    let line_matches: Vec<LineMatch> = if content_atoms.is_empty() {
        Vec::new()
    } else {
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| content_atoms.iter().any(|q| q.atom_matches_text(line)))
            .map(|(i, line)| LineMatch {
                line_number: i + 1,
                line: line.to_string(),
            })
            .collect()
    };

    let file_name = path.rsplit('/').next().unwrap_or(path);
    let important = atoms.iter().any(|q| q.atom_matches_text(file_name));

    let mut score = line_matches.len() as f64;
    if important {
        score += IMPORTANT_BOOST;
    }

    FileMatch {
        file_name: path.to_string(),
        repository: repository.to_string(),
        score,
        important,
        line_matches,
    }
}

fn compare_matches(a: &FileMatch, b: &FileMatch) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.repository.cmp(&b.repository))
        .then_with(|| a.file_name.cmp(&b.file_name))
}
