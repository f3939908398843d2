//! Remote tree abstraction.
//!
//! A [`RemoteTree`] lists directories and fetches file contents. The walker
//! and the ingestion pipeline only talk to this trait, so the same pipeline
//! indexes a local checkout ([`source_fs`](crate::source_fs)), an SVN
//! repository ([`source_svn`](crate::source_svn)) or an in-memory tree.
//!
//! # Contract
//!
//! - [`list`](RemoteTree::list) returns the direct children of a directory
//!   in a stable order. It fails on I/O or permission errors.
//! - [`fetch`](RemoteTree::fetch) returns the raw bytes of a file.
//!
//! Both take absolute tree paths as produced by [`TreeEntry::absolute_path`].

use std::collections::{BTreeMap, HashSet};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{EntryKind, TreeEntry};

#[async_trait]
pub trait RemoteTree: Send + Sync {
    /// Short label for logs (e.g. `"fs"`, `"svn"`).
    fn kind(&self) -> &str;

    /// List the direct children of `path`.
    async fn list(&self, path: &str) -> Result<Vec<TreeEntry>>;

    /// Fetch the content of the file at `path`.
    async fn fetch(&self, path: &str) -> Result<Vec<u8>>;
}

/// In-memory tree for tests and embedding.
///
/// Paths are inserted with [`add_file`](MemoryTree::add_file); parent
/// directories are created implicitly. Individual directories or files can
/// be marked as failing to exercise error paths.
#[derive(Debug, Default)]
pub struct MemoryTree {
    /// Directory path → children in insertion order.
    dirs: BTreeMap<String, Vec<TreeEntry>>,
    files: BTreeMap<String, Vec<u8>>,
    failing_dirs: HashSet<String>,
    failing_files: HashSet<String>,
}

impl MemoryTree {
    pub fn new(root: &str) -> Self {
        let mut tree = Self::default();
        tree.dirs.insert(normalize(root), Vec::new());
        tree
    }

    /// Add a file at `path`, creating missing parent directories.
    pub fn add_file(&mut self, path: &str, content: impl Into<Vec<u8>>) -> &mut Self {
        let path = normalize(path);
        self.ensure_parent(&path, EntryKind::File);
        self.files.insert(path, content.into());
        self
    }

    /// Add an empty directory at `path`.
    pub fn add_dir(&mut self, path: &str) -> &mut Self {
        let path = normalize(path);
        if !self.dirs.contains_key(&path) {
            self.ensure_parent(&path, EntryKind::Directory);
            self.dirs.insert(path, Vec::new());
        }
        self
    }

    /// Make listing `path` fail.
    pub fn fail_listing(&mut self, path: &str) -> &mut Self {
        self.failing_dirs.insert(normalize(path));
        self
    }

    /// Make fetching `path` fail.
    pub fn fail_fetch(&mut self, path: &str) -> &mut Self {
        self.failing_files.insert(normalize(path));
        self
    }

    fn ensure_parent(&mut self, path: &str, kind: EntryKind) {
        let Some((parent, name)) = path.rsplit_once('/') else {
            return;
        };
        if name.is_empty() {
            return;
        }
        let parent = if parent.is_empty() { "/" } else { parent };
        if !self.dirs.contains_key(parent) {
            self.add_dir(parent);
        }
        let children = self.dirs.entry(parent.to_string()).or_default();
        if !children.iter().any(|c| c.name == name) {
            children.push(TreeEntry::child(parent, name, kind));
        }
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl RemoteTree for MemoryTree {
    fn kind(&self) -> &str {
        "memory"
    }

    async fn list(&self, path: &str) -> Result<Vec<TreeEntry>> {
        let path = normalize(path);
        if self.failing_dirs.contains(&path) {
            return Err(anyhow!("permission denied: {}", path));
        }
        self.dirs
            .get(&path)
            .cloned()
            .ok_or_else(|| anyhow!("no such directory: {}", path))
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        let path = normalize(path);
        if self.failing_files.contains(&path) {
            return Err(anyhow!("transient read failure: {}", path));
        }
        self.files
            .get(&path)
            .cloned()
            .ok_or_else(|| anyhow!("no such file: {}", path))
    }
}
