//! # treeshard CLI (`tshard`)
//!
//! ## Usage
//!
//! ```bash
//! tshard --config ./config/treeshard.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tshard index <ROOT>...` | Walk each root and publish its shards into the index directory |
//! | `tshard search "<query>"` | Budgeted search over the index |
//! | `tshard serve` | Start the HTTP search server |
//!
//! ## Examples
//!
//! ```bash
//! # Index a local checkout
//! tshard index ~/src/project
//!
//! # Index an SVN trunk through the svn client
//! tshard index --source svn svn://svn.example.org/repos/project/trunk
//!
//! # Search one repository, five results, JSON output
//! tshard search "open file:.c" --repo project --num 5 --json
//!
//! # Serve on [server].bind
//! tshard serve
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use treeshard::config::{self, SourceKind};
use treeshard::progress::ProgressMode;
use treeshard::{ingest, search, server};

/// treeshard: harvest source trees into search shards and serve budgeted
/// code search over them.
#[derive(Parser)]
#[command(name = "tshard", version, about = "Harvest source trees into search shards and serve budgeted code search")]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/treeshard.toml`. Built-in defaults are used
    /// when the file does not exist.
    #[arg(long, global = true, default_value = "./config/treeshard.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index one or more trees.
    ///
    /// Each root becomes one repository named after its last path
    /// component. Shards of a previous run for the same repository are
    /// replaced.
    Index {
        /// Tree roots: directories for `fs`, URLs for `svn`.
        #[arg(required = true)]
        roots: Vec<String>,

        /// Tree source. Overrides `[source].kind`.
        #[arg(long)]
        source: Option<SourceKind>,

        /// Progress output on stderr: `off`, `human` or `json`.
        /// Defaults to `human` when stderr is a terminal.
        #[arg(long)]
        progress: Option<ProgressMode>,
    },

    /// Search the index.
    Search {
        /// Query string, e.g. `"open file:.c -test"`.
        query: String,

        /// Restrict to one repository.
        #[arg(long)]
        repo: Option<String>,

        /// Number of results. Defaults to `[search].default_num_results`.
        #[arg(long, short = 'n')]
        num: Option<usize>,

        /// Print `{ "files": [...] }` JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP search server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Index {
            roots,
            source,
            progress,
        } => {
            let source = source.unwrap_or(cfg.source.kind);
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_index(&cfg, &roots, source, progress).await?;
        }
        Commands::Search {
            query,
            repo,
            num,
            json,
        } => {
            search::run_search(&cfg, &query, repo, num, json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
