//! Shard building.
//!
//! The ingestion pipeline hands every document to a [`ShardBuilder`] and
//! calls [`finish`](ShardBuilder::finish) once the walk is drained.
//! [`DirectoryBuilder`] writes JSON shards into an index directory;
//! [`MemoryBuilder`] keeps documents in memory for tests and embedding.
//!
//! # Shard files
//!
//! One repository is split into `<repo>_v1.<nnnnn>.shard.json` files, each
//! holding at most `shard_limit` content bytes:
//!
//! ```json
//! { "meta": { "format_version": 1, "created_at": "...", "document_count": 2,
//!             "content_sha256": "..." },
//!   "shard": { "repository": "proj", "documents": [{ "path": "a.c", "content": "..." }] } }
//! ```
//!
//! Publishing is all-or-nothing up to the rename step: every shard is first
//! written to a `.tmp` file, then all are renamed into place, then shards of
//! the same repository left over from a previous run are removed.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use treeshard_core::models::{Shard, ShardDocument};

use crate::config::IndexConfig;

pub const SHARD_FORMAT_VERSION: u32 = 1;
pub const SHARD_SUFFIX: &str = ".shard.json";

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid document path {0:?}: must be non-empty and relative")]
    InvalidPath(String),
    #[error("builder already finished")]
    Finished,
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode shard: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{0}")]
    Rejected(String),
}

impl BuildError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What `add` did with a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// Over `file_limit`.
    SkippedLarge,
    /// Contains NUL bytes.
    SkippedBinary,
}

/// Sink for ingested documents.
///
/// `add` is called once per document in walk order; `finish` once at the
/// end. A failed `add` aborts ingestion and `finish` is then never called.
#[async_trait]
pub trait ShardBuilder: Send {
    async fn add(&mut self, path: &str, content: Vec<u8>) -> Result<AddOutcome, BuildError>;

    async fn finish(&mut self) -> Result<BuildSummary, BuildError>;
}

/// What a builder published.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub documents: usize,
    pub shards: usize,
    pub content_bytes: usize,
    /// Files over `file_limit`.
    pub skipped_large: usize,
    /// Files containing NUL bytes.
    pub skipped_binary: usize,
    pub shard_paths: Vec<PathBuf>,
    pub stale_removed: usize,
}

/// Header stored next to the documents of a shard file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardMeta {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub document_count: usize,
    pub content_sha256: String,
}

/// On-disk shard file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardFile {
    pub meta: ShardMeta,
    pub shard: Shard,
}

impl ShardFile {
    pub fn new(shard: Shard) -> Self {
        Self {
            meta: ShardMeta {
                format_version: SHARD_FORMAT_VERSION,
                created_at: Utc::now(),
                document_count: shard.documents.len(),
                content_sha256: checksum(&shard),
            },
            shard,
        }
    }

    /// Whether the stored checksum and count agree with the documents.
    pub fn verify(&self) -> bool {
        self.meta.document_count == self.shard.documents.len()
            && self.meta.content_sha256 == checksum(&self.shard)
    }
}

/// SHA-256 over every document's path and content, NUL separated.
pub fn checksum(shard: &Shard) -> String {
    let mut hasher = Sha256::new();
    for doc in &shard.documents {
        hasher.update(doc.path.as_bytes());
        hasher.update([0u8]);
        hasher.update(doc.content.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Repository name as it appears in file names.
fn file_stem(repository: &str) -> String {
    repository
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub fn shard_file_name(repository: &str, index: usize) -> String {
    format!("{}_v{}.{:05}{}", file_stem(repository), SHARD_FORMAT_VERSION, index, SHARD_SUFFIX)
}

/// Whether `file_name` is a shard of `repository` (any index).
fn is_shard_of(file_name: &str, repository: &str) -> bool {
    let prefix = format!("{}_v{}.", file_stem(repository), SHARD_FORMAT_VERSION);
    file_name
        .strip_prefix(&prefix)
        .and_then(|rest| rest.strip_suffix(SHARD_SUFFIX))
        .is_some_and(|n| n.len() == 5 && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Settings for [`DirectoryBuilder`].
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub index_dir: PathBuf,
    pub repository: String,
    /// Larger files are skipped.
    pub file_limit: usize,
    /// Content bytes per shard before a new shard is started.
    pub shard_limit: usize,
}

impl BuildOptions {
    pub fn new(index_dir: impl Into<PathBuf>, repository: impl Into<String>) -> Self {
        let defaults = IndexConfig::default();
        Self {
            index_dir: index_dir.into(),
            repository: repository.into(),
            file_limit: defaults.file_limit,
            shard_limit: defaults.shard_limit,
        }
    }

    pub fn from_config(config: &IndexConfig, repository: impl Into<String>) -> Self {
        Self {
            index_dir: config.dir.clone(),
            repository: repository.into(),
            file_limit: config.file_limit,
            shard_limit: config.shard_limit,
        }
    }
}

/// Writes JSON shards for one repository into an index directory.
pub struct DirectoryBuilder {
    opts: BuildOptions,
    sealed: Vec<Shard>,
    current: Shard,
    current_bytes: usize,
    summary: BuildSummary,
    finished: bool,
}

impl DirectoryBuilder {
    pub fn new(opts: BuildOptions) -> Self {
        let current = Shard::new(opts.repository.clone());
        Self {
            opts,
            sealed: Vec::new(),
            current,
            current_bytes: 0,
            summary: BuildSummary::default(),
            finished: false,
        }
    }

    fn seal_current(&mut self) {
        let next = Shard::new(self.opts.repository.clone());
        let full = std::mem::replace(&mut self.current, next);
        self.current_bytes = 0;
        self.sealed.push(full);
    }

    async fn publish(&mut self, shards: Vec<Shard>) -> Result<(), BuildError> {
        let dir = self.opts.index_dir.clone();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| BuildError::io(&dir, e))?;

        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(shards.len());
        for (i, shard) in shards.into_iter().enumerate() {
            let final_path = dir.join(shard_file_name(&self.opts.repository, i));
            let tmp_path = final_path.with_extension("json.tmp");
            let written = write_shard(&tmp_path, ShardFile::new(shard)).await;
            staged.push((tmp_path, final_path));
            if let Err(e) = written {
                discard(&staged).await;
                return Err(e);
            }
        }

        for (i, (tmp, dest)) in staged.iter().enumerate() {
            if let Err(e) = tokio::fs::rename(tmp, dest).await {
                let published: Vec<String> = staged[..i]
                    .iter()
                    .map(|(_, dest)| dest.display().to_string())
                    .collect();
                tracing::error!(
                    repository = %self.opts.repository,
                    failed = %dest.display(),
                    ?published,
                    "rename failed part way, index holds a mix of new and previous shards"
                );
                discard(&staged[i..]).await;
                return Err(BuildError::io(dest, e));
            }
        }
        self.summary.shard_paths = staged.into_iter().map(|(_, dest)| dest).collect();
        self.summary.stale_removed = self.remove_stale().await?;
        Ok(())
    }

    async fn remove_stale(&self) -> Result<usize, BuildError> {
        let dir = &self.opts.index_dir;
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| BuildError::io(dir, e))?;
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await.map_err(|e| BuildError::io(dir, e))? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !is_shard_of(name, &self.opts.repository) || self.summary.shard_paths.contains(&path) {
                continue;
            }
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| BuildError::io(&path, e))?;
            tracing::debug!(path = %path.display(), "removed stale shard");
            removed += 1;
        }
        Ok(removed)
    }
}

async fn write_shard(path: &Path, file: ShardFile) -> Result<(), BuildError> {
    let bytes = serde_json::to_vec(&file)?;
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| BuildError::io(path, e))
}

async fn discard(staged: &[(PathBuf, PathBuf)]) {
    for (tmp, _) in staged {
        let _ = tokio::fs::remove_file(tmp).await;
    }
}

fn validate_path(path: &str) -> Result<(), BuildError> {
    if path.is_empty() || path.starts_with('/') {
        return Err(BuildError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Decode content as UTF-8, replacing invalid sequences.
fn into_text(content: Vec<u8>) -> String {
    String::from_utf8(content).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

#[async_trait]
impl ShardBuilder for DirectoryBuilder {
    async fn add(&mut self, path: &str, content: Vec<u8>) -> Result<AddOutcome, BuildError> {
        if self.finished {
            return Err(BuildError::Finished);
        }
        validate_path(path)?;

        if content.len() > self.opts.file_limit {
            tracing::info!(path, size = content.len(), limit = self.opts.file_limit, "skipping large file");
            self.summary.skipped_large += 1;
            return Ok(AddOutcome::SkippedLarge);
        }
        if content.contains(&0) {
            tracing::debug!(path, "skipping binary file");
            self.summary.skipped_binary += 1;
            return Ok(AddOutcome::SkippedBinary);
        }

        let text = into_text(content);
        if !self.current.documents.is_empty() && self.current_bytes + text.len() > self.opts.shard_limit {
            self.seal_current();
        }
        self.current_bytes += text.len();
        self.summary.content_bytes += text.len();
        self.summary.documents += 1;
        self.current.documents.push(ShardDocument {
            path: path.to_string(),
            content: text,
        });
        Ok(AddOutcome::Added)
    }

    async fn finish(&mut self) -> Result<BuildSummary, BuildError> {
        if self.finished {
            return Err(BuildError::Finished);
        }
        self.finished = true;
        if !self.current.documents.is_empty() {
            self.seal_current();
        }
        let shards = std::mem::take(&mut self.sealed);
        self.summary.shards = shards.len();
        self.publish(shards).await?;

        tracing::info!(
            repository = %self.opts.repository,
            documents = self.summary.documents,
            shards = self.summary.shards,
            "published shards"
        );
        Ok(self.summary.clone())
    }
}

/// Keeps added documents in memory.
///
/// `fail_add_at` and `fail_finish` inject failures for exercising the
/// pipeline's abort paths.
#[derive(Debug, Default)]
pub struct MemoryBuilder {
    pub documents: Vec<(String, Vec<u8>)>,
    pub finished: bool,
    pub fail_add_at: Option<usize>,
    pub fail_finish: bool,
}

impl MemoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paths(&self) -> Vec<&str> {
        self.documents.iter().map(|(p, _)| p.as_str()).collect()
    }
}

#[async_trait]
impl ShardBuilder for MemoryBuilder {
    async fn add(&mut self, path: &str, content: Vec<u8>) -> Result<AddOutcome, BuildError> {
        validate_path(path)?;
        if self.fail_add_at == Some(self.documents.len()) {
            return Err(BuildError::Rejected(format!("refusing {}", path)));
        }
        self.documents.push((path.to_string(), content));
        Ok(AddOutcome::Added)
    }

    async fn finish(&mut self) -> Result<BuildSummary, BuildError> {
        if self.fail_finish {
            return Err(BuildError::Rejected("finalize refused".to_string()));
        }
        self.finished = true;
        Ok(BuildSummary {
            documents: self.documents.len(),
            shards: 1,
            content_bytes: self.documents.iter().map(|(_, c)| c.len()).sum(),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(dir: &Path) -> BuildOptions {
        BuildOptions::new(dir, "proj")
    }

    fn read_shard(path: &Path) -> ShardFile {
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    fn shard_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn shard_file_names() {
        assert_eq!(shard_file_name("proj", 0), "proj_v1.00000.shard.json");
        assert_eq!(shard_file_name("my repo/x", 12), "my_repo_x_v1.00012.shard.json");
        assert!(is_shard_of("proj_v1.00003.shard.json", "proj"));
        assert!(!is_shard_of("proj_v1.00003.shard.json.tmp", "proj"));
        assert!(!is_shard_of("projx_v1.00003.shard.json", "proj"));
        assert!(!is_shard_of("proj_v1.x_v1.00000.shard.json", "proj"));
    }

    #[tokio::test]
    async fn writes_documents_in_add_order() {
        let tmp = TempDir::new().unwrap();
        let mut builder = DirectoryBuilder::new(options(tmp.path()));
        builder.add("b.c", b"int b;".to_vec()).await.unwrap();
        builder.add("a/a.c", b"int a;".to_vec()).await.unwrap();
        let summary = builder.finish().await.unwrap();

        assert_eq!(summary.documents, 2);
        assert_eq!(summary.shards, 1);
        assert_eq!(shard_names(tmp.path()), vec!["proj_v1.00000.shard.json"]);

        let file = read_shard(&summary.shard_paths[0]);
        assert!(file.verify());
        assert_eq!(file.meta.format_version, SHARD_FORMAT_VERSION);
        assert_eq!(file.shard.repository, "proj");
        let paths: Vec<&str> = file.shard.documents.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["b.c", "a/a.c"]);
    }

    #[tokio::test]
    async fn splits_on_shard_limit() {
        let tmp = TempDir::new().unwrap();
        let mut opts = options(tmp.path());
        opts.shard_limit = 10;
        let mut builder = DirectoryBuilder::new(opts);
        for name in ["1", "2", "3"] {
            builder.add(name, b"123456".to_vec()).await.unwrap();
        }
        let summary = builder.finish().await.unwrap();
        assert_eq!(summary.shards, 3);
        assert_eq!(
            shard_names(tmp.path()),
            vec![
                "proj_v1.00000.shard.json",
                "proj_v1.00001.shard.json",
                "proj_v1.00002.shard.json"
            ]
        );
    }

    #[tokio::test]
    async fn skips_large_and_binary_files() {
        let tmp = TempDir::new().unwrap();
        let mut opts = options(tmp.path());
        opts.file_limit = 8;
        let mut builder = DirectoryBuilder::new(opts);
        assert_eq!(builder.add("big.txt", vec![b'x'; 9]).await.unwrap(), AddOutcome::SkippedLarge);
        assert_eq!(builder.add("bin.o", vec![1, 0, 2]).await.unwrap(), AddOutcome::SkippedBinary);
        assert_eq!(builder.add("ok.txt", b"fine".to_vec()).await.unwrap(), AddOutcome::Added);
        let summary = builder.finish().await.unwrap();
        assert_eq!(summary.documents, 1);
        assert_eq!(summary.skipped_large, 1);
        assert_eq!(summary.skipped_binary, 1);
    }

    #[tokio::test]
    async fn rejects_invalid_paths() {
        let tmp = TempDir::new().unwrap();
        let mut builder = DirectoryBuilder::new(options(tmp.path()));
        assert!(matches!(builder.add("", vec![]).await, Err(BuildError::InvalidPath(_))));
        assert!(matches!(
            builder.add("/abs/x.c", vec![]).await,
            Err(BuildError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn rebuild_replaces_stale_shards_of_same_repo_only() {
        let tmp = TempDir::new().unwrap();
        let mut opts = options(tmp.path());
        opts.shard_limit = 4;
        let mut first = DirectoryBuilder::new(opts.clone());
        for name in ["a", "b", "c"] {
            first.add(name, b"abcd".to_vec()).await.unwrap();
        }
        first.finish().await.unwrap();

        let mut other = DirectoryBuilder::new(BuildOptions::new(tmp.path(), "other"));
        other.add("z", b"z".to_vec()).await.unwrap();
        other.finish().await.unwrap();

        let mut second = DirectoryBuilder::new(opts);
        second.add("a", b"abcd".to_vec()).await.unwrap();
        let summary = second.finish().await.unwrap();
        assert_eq!(summary.stale_removed, 2);
        assert_eq!(
            shard_names(tmp.path()),
            vec!["other_v1.00000.shard.json", "proj_v1.00000.shard.json"]
        );
    }

    #[tokio::test]
    async fn failed_rename_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        // A non-empty directory where the second shard must land.
        let blocker = tmp.path().join(shard_file_name("proj", 1));
        std::fs::create_dir(&blocker).unwrap();
        std::fs::write(blocker.join("keep"), "x").unwrap();

        let mut opts = options(tmp.path());
        opts.shard_limit = 4;
        let mut builder = DirectoryBuilder::new(opts);
        for name in ["a", "b", "c"] {
            builder.add(name, b"abcd".to_vec()).await.unwrap();
        }
        let err = builder.finish().await.unwrap_err();
        assert!(matches!(err, BuildError::Io { .. }));

        let names = shard_names(tmp.path());
        assert!(names.iter().all(|n| !n.ends_with(".tmp")), "{:?}", names);
        assert_eq!(
            names,
            vec!["proj_v1.00000.shard.json", "proj_v1.00001.shard.json"]
        );
    }

    #[tokio::test]
    async fn finish_twice_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let mut builder = DirectoryBuilder::new(options(tmp.path()));
        builder.finish().await.unwrap();
        assert!(matches!(builder.finish().await, Err(BuildError::Finished)));
        assert!(matches!(builder.add("x", vec![]).await, Err(BuildError::Finished)));
    }

    #[tokio::test]
    async fn memory_builder_failure_injection() {
        let mut builder = MemoryBuilder {
            fail_add_at: Some(1),
            ..Default::default()
        };
        builder.add("a", b"a".to_vec()).await.unwrap();
        assert!(builder.add("b", b"b".to_vec()).await.is_err());
        assert_eq!(builder.paths(), vec!["a"]);
    }
}
