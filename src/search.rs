//! `tshard search`: budgeted search over the local index.
//!
//! Also defines the JSON result shape shared with the HTTP server.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use treeshard_core::{BudgetedSearch, Budgeter, SearchResult};

use crate::config::Config;
use crate::index_dir;

/// Search response: `{ "files": [{ "file", "repo", "lines": [..] }] }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub files: Vec<FileHit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHit {
    pub file: String,
    pub repo: String,
    pub lines: Vec<String>,
}

impl From<&SearchResult> for SearchResponse {
    fn from(result: &SearchResult) -> Self {
        let files = result
            .files
            .iter()
            .map(|f| FileHit {
                file: f.file_name.clone(),
                repo: f.repository.clone(),
                lines: f.line_matches.iter().map(|l| l.line.clone()).collect(),
            })
            .collect();
        SearchResponse { files }
    }
}

pub async fn run_search(
    config: &Config,
    query: &str,
    repo: Option<String>,
    num: Option<usize>,
    json: bool,
) -> Result<()> {
    let searcher = Arc::new(index_dir::open_searcher(&config.index.dir)?);
    let budgeter = Budgeter::new(searcher);
    let num = num.unwrap_or(config.search.default_num_results);

    let outcome = budgeter
        .search(query, num, repo.as_deref().unwrap_or(""))
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&SearchResponse::from(&outcome.result))?);
        return Ok(());
    }
    print_results(&outcome);
    Ok(())
}

fn print_results(outcome: &BudgetedSearch) {
    if outcome.result.files.is_empty() {
        println!("No results.");
        return;
    }

    for (i, file) in outcome.result.files.iter().enumerate() {
        println!("{}. [{:.2}] {} / {}", i + 1, file.score, file.repository, file.file_name);
        for line in &file.line_matches {
            println!("    {}: {}", line.line_number, line.line.trim());
        }
        println!();
    }
    println!(
        "{} files ({} documents searched)",
        outcome.result.files.len(),
        outcome.num_docs
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use treeshard_core::{FileMatch, LineMatch};

    #[test]
    fn response_shape() {
        let result = SearchResult {
            files: vec![FileMatch {
                file_name: "src/main.c".into(),
                repository: "proj".into(),
                score: 2.0,
                important: false,
                line_matches: vec![LineMatch {
                    line_number: 3,
                    line: "int main() {".into(),
                }],
            }],
            ..Default::default()
        };
        let value = serde_json::to_value(SearchResponse::from(&result)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "files": [{ "file": "src/main.c", "repo": "proj", "lines": ["int main() {"] }]
            })
        );
    }
}
