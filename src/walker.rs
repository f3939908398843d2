//! Depth-first tree walker.
//!
//! Lists the root, emits every file path into the queue in listing order,
//! and descends into each directory as soon as it is encountered, exactly
//! like a recursive traversal. The recursion is kept on an explicit stack of
//! per-directory iterators, so tree depth is bounded by memory rather than
//! by the call stack.
//!
//! A directory whose listing fails is pruned: its remaining entries are not
//! emitted, siblings and cousins are unaffected, and the failure is recorded
//! in [`WalkReport::errors`] instead of being dropped.

use std::collections::HashSet;

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use thiserror::Error;

use crate::models::{relativize, EntryKind, TreeEntry};
use crate::queue::QueueSender;
use crate::tree::RemoteTree;

/// A directory listing that failed; that subtree was skipped.
#[derive(Debug, Clone, Error)]
#[error("failed to list {path}: {message}")]
pub struct TraversalError {
    pub path: String,
    pub message: String,
}

/// What the walk did.
#[derive(Debug, Default)]
pub struct WalkReport {
    pub files_emitted: usize,
    pub dirs_listed: usize,
    /// Directories skipped because their name is in `ignore_dirs`.
    pub dirs_ignored: usize,
    /// Files skipped by `exclude_globs`.
    pub files_excluded: usize,
    pub errors: Vec<TraversalError>,
    /// The consumer went away before the walk finished.
    pub cancelled: bool,
}

/// Directory names to skip and root-relative globs to exclude.
#[derive(Debug, Clone)]
pub struct WalkFilter {
    ignore_dirs: HashSet<String>,
    exclude: GlobSet,
    has_excludes: bool,
}

impl WalkFilter {
    pub fn new(ignore_dirs: &[String], exclude_globs: &[String]) -> Result<Self> {
        Ok(Self {
            ignore_dirs: ignore_dirs.iter().cloned().collect(),
            exclude: build_globset(exclude_globs)?,
            has_excludes: !exclude_globs.is_empty(),
        })
    }

    /// Filter that lets everything through.
    pub fn none() -> Self {
        Self {
            ignore_dirs: HashSet::new(),
            exclude: GlobSet::empty(),
            has_excludes: false,
        }
    }

    fn skips_dir(&self, name: &str) -> bool {
        self.ignore_dirs.contains(name)
    }

    fn excludes_file(&self, root: &str, path: &str) -> bool {
        if !self.has_excludes {
            return false;
        }
        let rel = relativize(root, path);
        self.exclude.is_match(rel.as_deref().unwrap_or(path))
    }
}

impl Default for WalkFilter {
    fn default() -> Self {
        Self::none()
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Walk `root`, sending absolute file paths into `sink`.
///
/// Returns when the tree is exhausted or the receiver is dropped. The
/// caller closes the queue afterwards.
pub async fn walk(
    tree: &dyn RemoteTree,
    root: &str,
    sink: &QueueSender<String>,
    filter: &WalkFilter,
) -> WalkReport {
    let mut report = WalkReport::default();
    let mut stack: Vec<std::vec::IntoIter<TreeEntry>> = Vec::new();

    match list_dir(tree, root, &mut report).await {
        Some(entries) => stack.push(entries.into_iter()),
        None => return report,
    }

    while let Some(entries) = stack.last_mut() {
        let Some(entry) = entries.next() else {
            stack.pop();
            continue;
        };

        match entry.kind {
            EntryKind::File => {
                if filter.excludes_file(root, &entry.absolute_path) {
                    report.files_excluded += 1;
                    continue;
                }
                if sink.send(entry.absolute_path).await.is_err() {
                    tracing::debug!(root, "receiver dropped, stopping walk");
                    report.cancelled = true;
                    break;
                }
                report.files_emitted += 1;
            }
            EntryKind::Directory => {
                if filter.skips_dir(&entry.name) {
                    report.dirs_ignored += 1;
                    continue;
                }
                if let Some(children) = list_dir(tree, &entry.absolute_path, &mut report).await {
                    stack.push(children.into_iter());
                }
            }
        }
    }

    report
}

async fn list_dir(tree: &dyn RemoteTree, path: &str, report: &mut WalkReport) -> Option<Vec<TreeEntry>> {
    match tree.list(path).await {
        Ok(entries) => {
            report.dirs_listed += 1;
            Some(entries)
        }
        Err(e) => {
            tracing::warn!(path, error = %e, "listing failed, skipping subtree");
            report.errors.push(TraversalError {
                path: path.to_string(),
                message: format!("{:#}", e),
            });
            None
        }
    }
}
