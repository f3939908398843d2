//! # treeshard
//!
//! Harvests tree-structured repositories (local directories, SVN) into
//! search shards and serves adaptively budgeted code search over them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────┐   ┌──────────────────┐   ┌──────────────┐
//! │ RemoteTree  │──▶│ walker  │──▶│ queue (bounded)  │──▶│ ingest       │
//! │ fs/svn/mem  │   │  (DFS)  │   └──────────────────┘   │ fetch+extract│
//! └─────────────┘   └─────────┘                          └──────┬───────┘
//!                                                               ▼
//!                    ┌──────────┐   ┌──────────────┐     ┌──────────────┐
//!                    │ CLI/HTTP │──▶│  Budgeter    │◀────│ shard files  │
//!                    │ (tshard) │   │ (core crate) │     │ (builder)    │
//!                    └──────────┘   └──────────────┘     └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! tshard index ~/src/project            # walk and publish shards
//! tshard search "open file:.c"         # budgeted search
//! tshard serve                          # POST /search on 127.0.0.1:1166
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Tree entries and ingest documents |
//! | [`tree`] | `RemoteTree` trait and in-memory tree |
//! | [`source_fs`] | Local filesystem tree |
//! | [`source_svn`] | SVN tree via the `svn` client |
//! | [`walker`] | Depth-first tree walk into the queue |
//! | [`queue`] | Bounded queue with close semantics |
//! | [`extract`] | PDF/OOXML text extraction |
//! | [`builder`] | `ShardBuilder` trait and JSON shard writer |
//! | [`ingest`] | Walk → fetch → extract → build pipeline |
//! | [`index_dir`] | Loading shards into a searcher |
//! | [`search`] | CLI search and result shape |
//! | [`server`] | HTTP search server |
//! | [`progress`] | Indexing progress on stderr |
//!
//! Search models, the query language and the budgeting algorithm live in
//! the `treeshard-core` crate, re-exported here as [`core`].

pub use treeshard_core as core;

pub mod builder;
pub mod config;
pub mod extract;
pub mod index_dir;
pub mod ingest;
pub mod models;
pub mod progress;
pub mod queue;
pub mod search;
pub mod server;
pub mod source_fs;
pub mod source_svn;
pub mod tree;
pub mod walker;
