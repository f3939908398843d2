//! Local filesystem tree source.
//!
//! Lists directories with `tokio::fs`, sorted by name for a deterministic
//! walk. Symlinks to files are indexed; symlinks to directories are not
//! descended, so link cycles cannot trap the walker.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::models::{EntryKind, TreeEntry};
use crate::tree::RemoteTree;

#[derive(Debug, Default, Clone)]
pub struct FsTree;

impl FsTree {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RemoteTree for FsTree {
    fn kind(&self) -> &str {
        "fs"
    }

    async fn list(&self, path: &str) -> Result<Vec<TreeEntry>> {
        let mut dir = tokio::fs::read_dir(path)
            .await
            .with_context(|| format!("Failed to list directory {}", path))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .with_context(|| format!("Failed to read entry in {}", path))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry.file_type().await?;
            let kind = if file_type.is_dir() {
                EntryKind::Directory
            } else if file_type.is_file() {
                EntryKind::File
            } else if file_type.is_symlink() && is_file_target(&entry.path()).await {
                EntryKind::File
            } else {
                tracing::debug!(path = %entry.path().display(), "skipping special file");
                continue;
            };
            entries.push(TreeEntry::child(path, &name, kind));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read file {}", path))
    }
}

async fn is_file_target(link: &Path) -> bool {
    tokio::fs::metadata(link)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
