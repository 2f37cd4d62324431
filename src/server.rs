//! JSON HTTP server for the query service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/search?q=<text>&limit=<n>` | Ranked full-text search |
//! | `GET`  | `/documents/{id}` | Full document with metadata |
//! | `GET`  | `/documents/{id}/related` | Sibling and topical neighbours |
//! | `GET`  | `/documents/{id}/toc` | Heading outline |
//! | `POST` | `/rebuild` | Re-ingest the corpus and swap the snapshot |
//! | `GET`  | `/health` | Health check (version, document count, build time) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "invalid_query", "message": "invalid query: query must not be empty" } }
//! ```
//!
//! Error codes: `invalid_query` (400), `not_found` (404), `internal` (500).
//!
//! Requests already in flight when `/rebuild` swaps the snapshot finish
//! against the snapshot they started with. Rebuilds run one at a time, so the
//! served snapshot and the persisted one always come from the same build.

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::error::Error;
use crate::ingest::{self, BuildReport};
use crate::models::{Document, TocEntry};
use crate::query::{QueryService, RelatedDocument, SearchHit};
use crate::snapshot::SnapshotHandle;
use crate::store;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<QueryService>,
    pub config: Arc<Config>,
    /// Held across build, persist, and swap.
    rebuild_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(service: QueryService, config: Config) -> Self {
        Self {
            service: Arc::new(service),
            config: Arc::new(config),
            rebuild_lock: Arc::new(Mutex::new(())),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/search", get(handle_search))
        .route("/documents/{id}", get(handle_get))
        .route("/documents/{id}/related", get(handle_related))
        .route("/documents/{id}/toc", get(handle_toc))
        .route("/rebuild", post(handle_rebuild))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Loads the persisted snapshot and serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let snapshot = store::open_snapshot(config).await?;
    let documents = snapshot.document_count();
    let service = QueryService::new(Arc::new(SnapshotHandle::new(snapshot)), config);
    let state = AppState::new(service, config.clone());

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, documents, "server listening");
    println!("docmesh listening on http://{}", bind_addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
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
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(e: Error) -> Self {
        let status = match e {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ GET /search ============

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

async fn handle_search(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let Query(params) = params.map_err(|e| AppError {
        status: StatusCode::BAD_REQUEST,
        code: "invalid_query".to_string(),
        message: e.body_text(),
    })?;
    let results = state.service.search(&params.q, params.limit)?;
    Ok(Json(SearchResponse { results }))
}

// ============ GET /documents/{id} ============

async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Document>, AppError> {
    Ok(Json(state.service.get_document(&id)?))
}

#[derive(Serialize)]
struct RelatedResponse {
    id: String,
    related: Vec<RelatedDocument>,
}

async fn handle_related(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RelatedResponse>, AppError> {
    let related = state.service.related_to(&id)?;
    Ok(Json(RelatedResponse { id, related }))
}

#[derive(Serialize)]
struct TocResponse {
    id: String,
    toc: Vec<TocEntry>,
}

async fn handle_toc(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TocResponse>, AppError> {
    let toc = state.service.table_of_contents(&id)?;
    Ok(Json(TocResponse { id, toc }))
}

// ============ POST /rebuild ============

/// Builds a fresh snapshot from `corpus.root` and swaps it in.
///
/// The new snapshot is also persisted so a restart serves the same index.
async fn handle_rebuild(State(state): State<AppState>) -> Result<Json<BuildReport>, AppError> {
    let _guard = state.rebuild_lock.lock().await;

    let (snapshot, report) = ingest::build_snapshot(&state.config).await.map_err(|e| {
        error!(error = %e, "rebuild failed");
        internal(format!("rebuild failed: {}", e))
    })?;

    store::persist_snapshot(&state.config, &snapshot)
        .await
        .map_err(|e| internal(format!("failed to persist rebuilt index: {}", e)))?;

    state.service.handle().swap(snapshot);
    info!(documents = report.documents, "snapshot swapped");
    Ok(Json(report))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    documents: usize,
    built_at: DateTime<Utc>,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.service.snapshot();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        documents: snapshot.document_count(),
        built_at: snapshot.built_at(),
    })
}
