//! HTTP search server.
//!
//! Loads the index once at startup and answers budgeted searches over a
//! shared [`Budgeter`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/search` | `{ "query", "repo"?, "num"? }` → `{ "files": [...] }` |
//! | `GET`  | `/health` | Health check with version and loaded document count |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid query: query is empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `timeout` (408), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use treeshard_core::{Budgeter, QueryError, ShardedSearcher};

use crate::config::Config;
use crate::index_dir;
use crate::search::SearchResponse;

#[derive(Clone)]
struct AppState {
    budgeter: Arc<Budgeter<ShardedSearcher>>,
    default_num: usize,
}

/// Start the server on `[server].bind`. Runs until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let searcher = Arc::new(index_dir::open_searcher(&config.index.dir)?);
    let docs = searcher.document_count();
    let app = router(Arc::new(Budgeter::new(searcher)), config.search.default_num_results);

    let bind_addr = config.server.bind.clone();
    println!("treeshard server listening on http://{} ({} documents)", bind_addr, docs);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Routes over an already built budgeter.
pub fn router(budgeter: Arc<Budgeter<ShardedSearcher>>, default_num: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/search", post(handle_search))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { budgeter, default_num })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        let (status, code) = if err.is_timeout() {
            (StatusCode::REQUEST_TIMEOUT, "timeout")
        } else {
            match err {
                QueryError::Parse(_) | QueryError::InvalidCount => (StatusCode::BAD_REQUEST, "bad_request"),
                QueryError::Estimate(_) | QueryError::Search(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            }
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    documents: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        documents: state.budgeter.searcher().document_count(),
    })
}

// ============ POST /search ============

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    repo: Option<String>,
    #[serde(default)]
    num: Option<usize>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let num = req.num.unwrap_or(state.default_num);
    let outcome = state
        .budgeter
        .search(&req.query, num, req.repo.as_deref().unwrap_or(""))
        .await?;
    tracing::debug!(
        query = %req.query,
        num,
        files = outcome.result.files.len(),
        num_docs = outcome.num_docs,
        "served search"
    );
    Ok(Json(SearchResponse::from(&outcome.result)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use treeshard_core::models::{Shard, ShardDocument};

    fn state() -> AppState {
        let mut shard = Shard::new("proj");
        for (path, content) in [("main.c", "int main() {\n  return 0;\n}\n"), ("util.c", "int helper;\n")] {
            shard.documents.push(ShardDocument {
                path: path.into(),
                content: content.into(),
            });
        }
        let searcher = Arc::new(ShardedSearcher::new(vec![shard]));
        AppState {
            budgeter: Arc::new(Budgeter::new(searcher)),
            default_num: 50,
        }
    }

    fn request(query: &str, num: Option<usize>) -> Json<SearchRequest> {
        Json(SearchRequest {
            query: query.to_string(),
            repo: None,
            num,
        })
    }

    #[tokio::test]
    async fn search_returns_files_and_lines() {
        let Json(resp) = handle_search(State(state()), request("return", None))
            .await
            .ok()
            .unwrap();
        assert_eq!(resp.files.len(), 1);
        assert_eq!(resp.files[0].file, "main.c");
        assert_eq!(resp.files[0].repo, "proj");
        assert_eq!(resp.files[0].lines, vec!["  return 0;"]);
    }

    #[tokio::test]
    async fn num_limits_results() {
        let Json(resp) = handle_search(State(state()), request("int", Some(1)))
            .await
            .ok()
            .unwrap();
        assert_eq!(resp.files.len(), 1);
    }

    #[tokio::test]
    async fn bad_requests_map_to_400() {
        let err = handle_search(State(state()), request("   ", None)).await.err().unwrap();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "bad_request");

        let err = handle_search(State(state()), request("int", Some(0))).await.err().unwrap();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn timeouts_map_to_408() {
        let err = AppError::from(QueryError::Search(treeshard_core::SearchError::Timeout {
            elapsed: std::time::Duration::from_secs(10),
        }));
        assert_eq!(err.status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(err.code, "timeout");
    }

    #[tokio::test]
    async fn health_reports_documents() {
        let Json(health) = handle_health(State(state())).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.documents, 2);
    }
}
