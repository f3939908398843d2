//! Data models shared between the index builder and the search backend.
//!
//! A [`Shard`] is the unit the ingestion side publishes and the serving
//! side loads. Search requests are described by [`SearchOptions`] and
//! answered with a [`SearchResult`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single indexed file inside a shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardDocument {
    /// Path relative to the indexed root.
    pub path: String,
    /// Indexed text (already extracted for convertible formats).
    pub content: String,
}

/// A finalized partition of the index covering part of one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    /// Logical repository the documents belong to.
    pub repository: String,
    pub documents: Vec<ShardDocument>,
}

impl Shard {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            documents: Vec::new(),
        }
    }

    /// Total number of content bytes held by this shard.
    pub fn content_bytes(&self) -> usize {
        self.documents.iter().map(|d| d.content.len()).sum()
    }
}

/// Options understood by a [`Searcher`](crate::searcher::Searcher).
///
/// Every ceiling uses `0` as the "unset" sentinel, meaning unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOptions {
    /// Only compute corpus statistics; return no files.
    pub estimate_doc_count: bool,
    /// Restrict the search to one repository.
    pub repo: Option<String>,
    /// Wall-clock limit for the whole search.
    pub max_wall_time: Option<Duration>,
    /// Stop scanning a shard after this many matches.
    pub shard_max_match_count: usize,
    /// Stop scanning a shard after this many important matches.
    pub shard_max_important_match: usize,
    /// Stop the whole search after this many matches.
    pub total_max_match_count: usize,
    /// Stop the whole search after this many important matches.
    pub total_max_important_match: usize,
}

/// One matching line within a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineMatch {
    /// 1-based line number.
    pub line_number: usize,
    pub line: String,
}

/// A matched file, in backend relevance order.
#[derive(Debug, Clone, Serialize)]
pub struct FileMatch {
    pub file_name: String,
    pub repository: String,
    pub score: f64,
    /// Whether the match was classified as important (file name hit).
    pub important: bool,
    pub line_matches: Vec<LineMatch>,
}

/// Counters describing the work a search performed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    /// Documents eligible for (estimate mode) or examined by (full mode) the search.
    pub shard_files_considered: usize,
    pub match_count: usize,
    pub important_match_count: usize,
    pub shards_scanned: usize,
    pub shards_skipped: usize,
    /// Shards whose scan stopped early on a per-shard ceiling.
    pub shards_truncated: usize,
    /// Whether a total ceiling stopped the search.
    pub limit_hit: bool,
}

/// Search response: ordered files plus statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResult {
    pub files: Vec<FileMatch>,
    pub stats: SearchStats,
}
