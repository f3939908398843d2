//! Data types flowing through the ingestion pipeline.
//!
//! Search-side types (shards, results, options) live in `treeshard-core`.

/// Kind of node in a remote tree listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One node discovered while listing a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Fully qualified path within the remote tree.
    pub absolute_path: String,
    pub kind: EntryKind,
    /// Leaf component.
    pub name: String,
}

impl TreeEntry {
    /// Build an entry for `name` inside `parent`.
    pub fn child(parent: &str, name: &str, kind: EntryKind) -> Self {
        Self {
            absolute_path: join_path(parent, name),
            kind,
            name: name.to_string(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// A fetched file on its way to the shard builder.
#[derive(Debug, Clone)]
pub struct IngestDocument {
    /// Path relative to the indexing root; never carries the root prefix.
    pub relative_path: String,
    pub raw_content: Vec<u8>,
    /// MIME type guessed from the file extension.
    pub mime_hint: &'static str,
}

/// Join a tree path and a child name with exactly one `/`.
pub fn join_path(parent: &str, name: &str) -> String {
    format!("{}/{}", parent.trim_end_matches('/'), name)
}

/// Strip `root` from `path`, returning a path with no leading `/`.
///
/// Returns `None` when `path` does not live under `root`.
pub fn relativize(root: &str, path: &str) -> Option<String> {
    let root = root.trim_end_matches('/');
    let rest = path.strip_prefix(root)?;
    if !root.is_empty() && !rest.is_empty() && !rest.starts_with('/') {
        // `/srv/a` is not a prefix of `/srv/ab/x`
        return None;
    }
    let rel = rest.trim_start_matches('/');
    (!rel.is_empty()).then(|| rel.to_string())
}
