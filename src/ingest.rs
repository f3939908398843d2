//! Ingestion pipeline orchestration.
//!
//! One producer task walks the tree and pushes absolute file paths into a
//! bounded queue; the calling task consumes them in arrival order:
//!
//! ```text
//! walker ──▶ queue (bounded) ──▶ fetch ──▶ extract ──▶ relativize ──▶ builder.add
//!                                                                        │
//!                                              queue drained ──▶ builder.finish
//! ```
//!
//! Fetch and conversion failures skip that one file. A builder failure
//! aborts the run: the walker is stopped and `finish` is never called.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::builder::{AddOutcome, BuildError, BuildOptions, BuildSummary, DirectoryBuilder, ShardBuilder};
use crate::config::{Config, SourceKind};
use crate::extract::{extract, mime_hint_for_path};
use crate::models::{relativize, IngestDocument};
use crate::progress::{IndexProgressEvent, IndexProgressReporter, ProgressMode};
use crate::queue;
use crate::source_fs::FsTree;
use crate::source_svn::SvnTree;
use crate::tree::RemoteTree;
use crate::walker::{walk, WalkFilter, WalkReport};

/// Emit an `Ingesting` progress event every this many paths.
const PROGRESS_EVERY: u64 = 100;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("builder rejected {path}: {source}")]
    Build {
        path: String,
        #[source]
        source: BuildError,
    },
    #[error("failed to finalize shards: {0}")]
    Finalize(#[source] BuildError),
    #[error("tree walker task failed: {0}")]
    Walker(String),
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub queue_capacity: usize,
    pub filter: WalkFilter,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            queue_capacity: queue::DEFAULT_CAPACITY,
            filter: WalkFilter::none(),
        }
    }
}

/// Outcome of one ingestion run.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub root: String,
    /// Paths received from the walker.
    pub seen: u64,
    /// Documents the builder stored.
    pub added: u64,
    /// Documents the builder turned down (too large or binary).
    pub builder_skipped: u64,
    pub fetch_failed: u64,
    pub conversion_failed: u64,
    /// Paths the walker produced outside the root (nothing left after stripping).
    pub outside_root: u64,
    pub walk: WalkReport,
    pub build: BuildSummary,
}

impl IngestReport {
    /// Files seen but not indexed, for any reason. `added + skipped() == seen`
    /// once a run completes.
    pub fn skipped(&self) -> u64 {
        self.fetch_failed + self.conversion_failed + self.outside_root + self.builder_skipped
    }
}

/// Walk `root` in `tree` and feed every file to `builder`.
pub async fn ingest(
    tree: Arc<dyn RemoteTree>,
    root: &str,
    builder: &mut dyn ShardBuilder,
    opts: IngestOptions,
    progress: &dyn IndexProgressReporter,
) -> Result<IngestReport, IngestError> {
    let (tx, mut rx) = queue::bounded::<String>(opts.queue_capacity);
    progress.report(IndexProgressEvent::Discovering { root: root.to_string() });

    let producer = {
        let tree = tree.clone();
        let root = root.to_string();
        let filter = opts.filter;
        tokio::spawn(async move {
            let report = walk(tree.as_ref(), &root, &tx, &filter).await;
            tx.close();
            report
        })
    };

    let mut report = IngestReport {
        root: root.to_string(),
        ..Default::default()
    };

    while let Some(path) = rx.recv().await {
        report.seen += 1;
        if report.seen % PROGRESS_EVERY == 0 {
            progress.report(IndexProgressEvent::Ingesting {
                root: root.to_string(),
                added: report.added,
                seen: report.seen,
            });
        }

        let raw = match tree.fetch(&path).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "fetch failed, skipping");
                report.fetch_failed += 1;
                continue;
            }
        };

        let mime_hint = mime_hint_for_path(&path);
        let content = match extract(mime_hint, raw) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "conversion failed, skipping");
                report.conversion_failed += 1;
                continue;
            }
        };

        let Some(relative_path) = relativize(root, &path) else {
            tracing::warn!(path = %path, root, "path is not under the root, skipping");
            report.outside_root += 1;
            continue;
        };

        let doc = IngestDocument {
            relative_path,
            raw_content: content,
            mime_hint,
        };
        tracing::debug!(path = %doc.relative_path, mime = doc.mime_hint, "adding document");
        match builder.add(&doc.relative_path, doc.raw_content).await {
            Ok(AddOutcome::Added) => report.added += 1,
            Ok(AddOutcome::SkippedLarge | AddOutcome::SkippedBinary) => report.builder_skipped += 1,
            Err(source) => {
                // The walker sees the closed queue on its next send and stops.
                drop(rx);
                let _ = producer.await;
                return Err(IngestError::Build {
                    path: doc.relative_path,
                    source,
                });
            }
        }
    }

    report.walk = producer
        .await
        .map_err(|e| IngestError::Walker(e.to_string()))?;
    report.build = builder.finish().await.map_err(IngestError::Finalize)?;

    progress.report(IndexProgressEvent::Done {
        root: root.to_string(),
        added: report.added,
        skipped: report.skipped(),
    });
    tracing::info!(
        root,
        source = tree.kind(),
        added = report.added,
        skipped = report.skipped(),
        listing_errors = report.walk.errors.len(),
        "ingestion finished"
    );
    Ok(report)
}

/// Repository name for a root: its last path component.
pub fn repository_name(root: &str) -> String {
    let trimmed = root.trim_end_matches('/');
    trimmed
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(trimmed)
        .to_string()
}

async fn open_tree(config: &Config, source: SourceKind, root: &str) -> Result<(Arc<dyn RemoteTree>, String)> {
    match source {
        SourceKind::Fs => {
            let canonical = tokio::fs::canonicalize(Path::new(root))
                .await
                .with_context(|| format!("Index root does not exist: {}", root))?;
            let root = canonical.to_string_lossy().into_owned();
            Ok((Arc::new(FsTree::new()), root))
        }
        SourceKind::Svn => {
            let root = root.trim_end_matches('/').to_string();
            Ok((Arc::new(SvnTree::new(&config.source.svn_binary)), root))
        }
    }
}

/// `tshard index`: ingest every root into the configured index directory.
pub async fn run_index(config: &Config, roots: &[String], source: SourceKind, progress: ProgressMode) -> Result<()> {
    let filter = WalkFilter::new(&config.index.ignore_dirs, &config.index.exclude_globs)?;
    let reporter = progress.reporter();

    for root in roots {
        let (tree, root) = open_tree(config, source, root).await?;
        let repository = repository_name(&root);
        let mut builder = DirectoryBuilder::new(BuildOptions::from_config(&config.index, &repository));
        let opts = IngestOptions {
            queue_capacity: config.index.queue_capacity,
            filter: filter.clone(),
        };

        let report = ingest(tree, &root, &mut builder, opts, reporter.as_ref())
            .await
            .with_context(|| format!("Indexing {} failed", root))?;

        println!("index {}", root);
        println!("  repository: {}", repository);
        println!("  files seen: {}", report.seen);
        println!("  added documents: {}", report.build.documents);
        println!("  fetch failed: {}", report.fetch_failed);
        println!("  conversion skipped: {}", report.conversion_failed);
        println!("  too large: {}", report.build.skipped_large);
        println!("  binary: {}", report.build.skipped_binary);
        println!("  excluded: {}", report.walk.files_excluded);
        println!("  listing errors: {}", report.walk.errors.len());
        for err in &report.walk.errors {
            println!("    {}", err);
        }
        println!("  shards written: {}", report.build.shards);
    }
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::MemoryBuilder;
    use crate::progress::NoProgress;
    use crate::tree::MemoryTree;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<IndexProgressEvent>>,
    }

    impl IndexProgressReporter for RecordingProgress {
        fn report(&self, event: IndexProgressEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn docx(text: &str) -> Vec<u8> {
        use std::io::Write;
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            let xml = format!(
                "<w:document xmlns:w=\"w\"><w:body><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:body></w:document>",
                text
            );
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    fn sample_tree() -> MemoryTree {
        let mut tree = MemoryTree::new("/srv/proj");
        tree.add_file("/srv/proj/README", "readme")
            .add_file("/srv/proj/src/main.c", "int main() {}")
            .add_file("/srv/proj/src/util/str.c", "char *s;")
            .add_file("/srv/proj/docs/spec.docx", docx("design notes"))
            .add_file("/srv/proj/z.txt", "last");
        tree
    }

    async fn run(tree: MemoryTree, builder: &mut MemoryBuilder) -> Result<IngestReport, IngestError> {
        ingest(Arc::new(tree), "/srv/proj", builder, IngestOptions::default(), &NoProgress).await
    }

    #[tokio::test]
    async fn adds_relative_paths_in_walk_order() {
        let mut builder = MemoryBuilder::new();
        let report = run(sample_tree(), &mut builder).await.unwrap();

        assert_eq!(
            builder.paths(),
            vec!["README", "src/main.c", "src/util/str.c", "docs/spec.docx", "z.txt"]
        );
        assert!(builder.finished);
        assert_eq!(report.seen, 5);
        assert_eq!(report.added, 5);
        assert_eq!(report.skipped(), 0);
    }

    #[tokio::test]
    async fn convertible_formats_are_extracted() {
        let mut builder = MemoryBuilder::new();
        run(sample_tree(), &mut builder).await.unwrap();
        let (_, content) = builder
            .documents
            .iter()
            .find(|(p, _)| p == "docs/spec.docx")
            .unwrap();
        assert_eq!(content.as_slice(), b"design notes");
    }

    #[tokio::test]
    async fn failed_conversion_skips_only_that_file() {
        let mut tree = sample_tree();
        tree.add_file("/srv/proj/broken.pdf", "not a pdf");
        let mut builder = MemoryBuilder::new();
        let report = run(tree, &mut builder).await.unwrap();

        assert!(!builder.paths().contains(&"broken.pdf"));
        assert_eq!(builder.documents.len(), 5);
        assert_eq!(report.conversion_failed, 1);
        assert!(builder.finished);
    }

    #[tokio::test]
    async fn failed_fetch_skips_only_that_file() {
        let mut tree = sample_tree();
        tree.fail_fetch("/srv/proj/src/main.c");
        let mut builder = MemoryBuilder::new();
        let report = run(tree, &mut builder).await.unwrap();

        assert_eq!(
            builder.paths(),
            vec!["README", "src/util/str.c", "docs/spec.docx", "z.txt"]
        );
        assert_eq!(report.fetch_failed, 1);
    }

    #[tokio::test]
    async fn failed_listing_is_reported_and_siblings_survive() {
        let mut tree = sample_tree();
        tree.fail_listing("/srv/proj/src/util");
        let mut builder = MemoryBuilder::new();
        let report = run(tree, &mut builder).await.unwrap();

        assert_eq!(
            builder.paths(),
            vec!["README", "src/main.c", "docs/spec.docx", "z.txt"]
        );
        assert_eq!(report.walk.errors.len(), 1);
        assert_eq!(report.walk.errors[0].path, "/srv/proj/src/util");
    }

    #[tokio::test]
    async fn builder_failure_aborts_without_finish() {
        let mut builder = MemoryBuilder {
            fail_add_at: Some(2),
            ..Default::default()
        };
        let err = run(sample_tree(), &mut builder).await.unwrap_err();

        match err {
            IngestError::Build { path, .. } => assert_eq!(path, "src/util/str.c"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(builder.paths(), vec!["README", "src/main.c"]);
        assert!(!builder.finished);
    }

    #[tokio::test]
    async fn finalize_failure_is_fatal() {
        let mut builder = MemoryBuilder {
            fail_finish: true,
            ..Default::default()
        };
        let err = run(sample_tree(), &mut builder).await.unwrap_err();
        assert!(matches!(err, IngestError::Finalize(_)));
        assert_eq!(builder.documents.len(), 5);
    }

    #[tokio::test]
    async fn reingesting_is_idempotent() {
        let mut first = MemoryBuilder::new();
        let mut second = MemoryBuilder::new();
        run(sample_tree(), &mut first).await.unwrap();
        run(sample_tree(), &mut second).await.unwrap();
        assert_eq!(first.documents, second.documents);
    }

    #[tokio::test]
    async fn tiny_queue_preserves_order() {
        let mut tree = MemoryTree::new("/r");
        let expected: Vec<String> = (0..250).map(|i| format!("f{:03}.txt", i)).collect();
        for name in &expected {
            tree.add_file(&format!("/r/{}", name), name.as_str());
        }
        let mut builder = MemoryBuilder::new();
        let opts = IngestOptions {
            queue_capacity: 1,
            ..Default::default()
        };
        let progress = RecordingProgress::default();
        ingest(Arc::new(tree), "/r", &mut builder, opts, &progress)
            .await
            .unwrap();

        assert_eq!(builder.paths(), expected.iter().map(String::as_str).collect::<Vec<_>>());

        let events = progress.events.lock().unwrap();
        assert!(matches!(events.first(), Some(IndexProgressEvent::Discovering { .. })));
        assert!(matches!(
            events.last(),
            Some(IndexProgressEvent::Done { added: 250, .. })
        ));
        let ingesting = events
            .iter()
            .filter(|e| matches!(e, IndexProgressEvent::Ingesting { .. }))
            .count();
        assert_eq!(ingesting, 2);
    }

    #[tokio::test]
    async fn files_turned_down_by_the_builder_are_not_added() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut tree = MemoryTree::new("/r");
        tree.add_file("/r/huge.txt", vec![b'x'; 200_000])
            .add_file("/r/small.txt", "small")
            .add_file("/r/blob.bin", vec![7u8, 0, 7]);

        let mut opts = BuildOptions::new(tmp.path(), "r");
        opts.file_limit = 100_000;
        let mut builder = DirectoryBuilder::new(opts);
        let progress = RecordingProgress::default();
        let report = ingest(Arc::new(tree), "/r", &mut builder, IngestOptions::default(), &progress)
            .await
            .unwrap();

        assert_eq!(report.seen, 3);
        assert_eq!(report.added, 1);
        assert_eq!(report.builder_skipped, 2);
        assert_eq!(report.skipped(), 2);
        assert_eq!(report.added + report.skipped(), report.seen);
        assert_eq!(report.build.documents, 1);

        let events = progress.events.lock().unwrap();
        assert_eq!(
            events.last(),
            Some(&IndexProgressEvent::Done {
                root: "/r".to_string(),
                added: 1,
                skipped: 2,
            })
        );
    }

    #[test]
    fn repository_name_is_last_component() {
        assert_eq!(repository_name("/srv/repos/proj"), "proj");
        assert_eq!(repository_name("/srv/repos/proj/"), "proj");
        assert_eq!(repository_name("svn://host/repos/trunk"), "trunk");
        assert_eq!(repository_name("proj"), "proj");
    }
}
