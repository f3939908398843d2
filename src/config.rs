//! TOML configuration.
//!
//! ```toml
//! [index]
//! dir = "./data/index"
//! file_limit = 131072          # max bytes per indexed file
//! shard_limit = 104857600      # max content bytes per shard
//! queue_capacity = 100         # in-flight paths between walker and ingester
//! ignore_dirs = [".git", ".hg", ".svn"]
//! exclude_globs = ["**/*.min.js"]
//!
//! [source]
//! kind = "fs"                  # or "svn"
//! svn_binary = "svn"
//!
//! [search]
//! default_num_results = 50
//!
//! [server]
//! bind = "127.0.0.1:1166"
//! ```
//!
//! Every section is optional; missing values fall back to the defaults above.

use anyhow::{bail, Context, Result};
use globset::Glob;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_file_limit")]
    pub file_limit: usize,
    #[serde(default = "default_shard_limit")]
    pub shard_limit: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_ignore_dirs")]
    pub ignore_dirs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_index_dir(),
            file_limit: default_file_limit(),
            shard_limit: default_shard_limit(),
            queue_capacity: default_queue_capacity(),
            ignore_dirs: default_ignore_dirs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("./data/index")
}
fn default_file_limit() -> usize {
    128 * 1024
}
fn default_shard_limit() -> usize {
    100 << 20
}
fn default_queue_capacity() -> usize {
    100
}
fn default_ignore_dirs() -> Vec<String> {
    vec![".git".to_string(), ".hg".to_string(), ".svn".to_string()]
}

/// Which tree source `tshard index` reads from.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Fs,
    Svn,
}

impl std::str::FromStr for SourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fs" => Ok(SourceKind::Fs),
            "svn" => Ok(SourceKind::Svn),
            other => bail!("Unknown source kind: '{}'. Must be fs or svn.", other),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,
    #[serde(default = "default_svn_binary")]
    pub svn_binary: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Fs,
            svn_binary: default_svn_binary(),
        }
    }
}

fn default_svn_binary() -> String {
    "svn".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_num_results")]
    pub default_num_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_num_results: default_num_results(),
        }
    }
}

fn default_num_results() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:1166".to_string()
}

impl Config {
    /// All-defaults configuration, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }
}

/// Load the config at `path`, or the defaults when the file does not exist.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.index.queue_capacity == 0 {
        bail!("index.queue_capacity must be > 0");
    }
    if config.index.file_limit == 0 {
        bail!("index.file_limit must be > 0");
    }
    if config.index.shard_limit == 0 {
        bail!("index.shard_limit must be > 0");
    }
    if config.search.default_num_results == 0 {
        bail!("search.default_num_results must be >= 1");
    }
    for pattern in &config.index.exclude_globs {
        Glob::new(pattern)
            .with_context(|| format!("index.exclude_globs: invalid pattern '{}'", pattern))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn empty_file_gives_defaults() {
        let f = write_config("");
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.index.queue_capacity, 100);
        assert_eq!(cfg.index.file_limit, 131_072);
        assert_eq!(cfg.index.ignore_dirs, vec![".git", ".hg", ".svn"]);
        assert_eq!(cfg.source.kind, SourceKind::Fs);
        assert_eq!(cfg.search.default_num_results, 50);
    }

    #[test]
    fn parses_sections() {
        let f = write_config(
            r#"
[index]
dir = "/tmp/idx"
queue_capacity = 8
exclude_globs = ["**/*.bin"]

[source]
kind = "svn"
svn_binary = "/usr/local/bin/svn"

[server]
bind = "0.0.0.0:9000"
"#,
        );
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.index.dir, PathBuf::from("/tmp/idx"));
        assert_eq!(cfg.index.queue_capacity, 8);
        assert_eq!(cfg.source.kind, SourceKind::Svn);
        assert_eq!(cfg.source.svn_binary, "/usr/local/bin/svn");
        assert_eq!(cfg.server.bind, "0.0.0.0:9000");
    }

    #[test]
    fn rejects_invalid_values() {
        let f = write_config("[index]\nqueue_capacity = 0\n");
        assert!(load_config(f.path()).is_err());

        let f = write_config("[index]\nexclude_globs = [\"a[\"]\n");
        assert!(load_config(f.path()).is_err());

        let f = write_config("[source]\nkind = \"git\"\n");
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = load_or_default(Path::new("/nonexistent/treeshard.toml")).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:1166");
    }
}
