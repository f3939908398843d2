//! Loading published shards from an index directory.

use std::path::Path;

use anyhow::{Context, Result};
use treeshard_core::{Shard, ShardedSearcher};
use walkdir::WalkDir;

use crate::builder::{ShardFile, SHARD_FORMAT_VERSION, SHARD_SUFFIX};

/// Read every `*.shard.json` file under `dir`, sorted by file name.
///
/// Files that fail to parse or whose checksum does not match are skipped
/// with a warning. A missing directory yields no shards.
pub fn load_shards(dir: &Path) -> Result<Vec<Shard>> {
    if !dir.exists() {
        tracing::warn!(dir = %dir.display(), "index directory does not exist");
        return Ok(Vec::new());
    }

    let mut shards = Vec::new();
    for entry in WalkDir::new(dir).max_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to read index directory {}", dir.display()))?;
        let path = entry.path();
        let is_shard = entry.file_type().is_file()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(SHARD_SUFFIX));
        if !is_shard {
            continue;
        }

        let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let file: ShardFile = match serde_json::from_slice(&bytes) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable shard");
                continue;
            }
        };
        if file.meta.format_version != SHARD_FORMAT_VERSION || !file.verify() {
            tracing::warn!(path = %path.display(), "skipping shard with bad version or checksum");
            continue;
        }
        shards.push(file.shard);
    }

    tracing::info!(dir = %dir.display(), shards = shards.len(), "loaded index");
    Ok(shards)
}

/// Build a searcher over every shard in `dir`.
pub fn open_searcher(dir: &Path) -> Result<ShardedSearcher> {
    Ok(ShardedSearcher::new(load_shards(dir)?))
}
