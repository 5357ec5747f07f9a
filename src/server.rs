//! HTTP API over the project registry.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness plus the loaded projects |
//! | `POST` | `/index` | Register a project and index it in the background |
//! | `POST` | `/query` | Token-budgeted context for a query |
//! | `GET`  | `/stats` | Statistics for one project (`?project_path=`) |
//! | `GET`  | `/projects` | All indexed projects |
//! | `POST` | `/switch` | Change the current project |
//! | `DELETE` | `/clear` | Drop one project (`?project_path=`) or all |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Invalid project path: /nope does not exist" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//! Internal errors carry a generic message; details go to the log.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so editor extensions
//! and browser UIs can call the API directly.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::app::Services;
use crate::config::Config;
use crate::error::RagError;
use crate::project::{ProjectRegistry, ProjectStats};
use crate::watcher::WatcherManager;

const MAX_RESULTS_LIMIT: usize = 20;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    registry: Arc<ProjectRegistry>,
    watch_enabled: bool,
}

impl AppState {
    pub fn new(registry: Arc<ProjectRegistry>, watch_enabled: bool) -> Self {
        Self {
            registry,
            watch_enabled,
        }
    }
}

/// Start the HTTP server on `[server].bind`.
///
/// Restores previously indexed projects, starts their watchers, and serves
/// until Ctrl-C. Index state is persisted on the way out.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Services::from_config(config).await?;
    let watch_enabled = config.watcher.enabled;

    let manager = WatcherManager::new(config.watcher.clone());
    let mut registry = ProjectRegistry::new(services);
    if watch_enabled {
        registry = registry.with_watcher(manager.clone());
    }
    let registry = Arc::new(registry);

    let loaded = registry.load_existing().await?;
    tracing::info!(projects = loaded, "restored indexed projects");

    let ticker = if watch_enabled {
        let extensions = registry.services().default_extensions.clone();
        for project in registry.projects() {
            registry.watch(&project, &extensions);
        }
        Some(manager.spawn_ticker())
    } else {
        None
    };

    let app = router(AppState::new(registry.clone(), watch_enabled));
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "server listening");
    println!("code-context server listening on http://{}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutting down");
    if let Some(ticker) = ticker {
        ticker.abort();
    }
    manager.stop_all();
    registry.persist_all().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/index", post(handle_index))
        .route("/query", post(handle_query))
        .route("/stats", get(handle_stats))
        .route("/projects", get(handle_projects))
        .route("/switch", post(handle_switch))
        .route("/clear", delete(handle_clear))
        .layer(cors)
        .with_state(state)
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::InvalidPath(_) | RagError::NoProjects => bad_request(err.to_string()),
            RagError::ProjectNotIndexed(_) => not_found(err.to_string()),
            RagError::Internal(e) => {
                tracing::error!(error = %e, "request failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal".to_string(),
                    message: "internal error".to_string(),
                }
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    indexed_projects: usize,
    current_project: Option<String>,
    projects: Vec<String>,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = &state.registry;
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        indexed_projects: registry.len(),
        current_project: registry.current().map(|p| p.display().to_string()),
        projects: project_paths(registry),
    })
}

fn project_paths(registry: &ProjectRegistry) -> Vec<String> {
    registry
        .projects()
        .iter()
        .map(|p| p.root().display().to_string())
        .collect()
}

// ============ POST /index ============

#[derive(Deserialize)]
struct IndexRequest {
    project_path: String,
    #[serde(default)]
    file_extensions: Option<Vec<String>>,
    #[serde(default)]
    force_reindex: bool,
}

#[derive(Serialize)]
struct IndexResponse {
    status: String,
    message: String,
    project_path: String,
    file_extensions: Vec<String>,
    total_projects: usize,
}

/// Registers the project, starts its watcher, and runs the indexing pass
/// in a background task. Returns immediately.
async fn handle_index(
    State(state): State<AppState>,
    Json(req): Json<IndexRequest>,
) -> Result<Json<IndexResponse>, AppError> {
    let registry = &state.registry;
    let project = registry.open_project(&req.project_path).await?;
    let extensions = req
        .file_extensions
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| registry.services().default_extensions.clone());

    if state.watch_enabled {
        registry.watch(&project, &extensions);
    }

    let task_project = project.clone();
    let task_extensions = extensions.clone();
    let force = req.force_reindex;
    tokio::spawn(async move {
        if let Err(e) = task_project.index(&task_extensions, force).await {
            tracing::error!(root = %task_project.root().display(), error = %e, "indexing failed");
        }
    });

    let root = project.root().display().to_string();
    Ok(Json(IndexResponse {
        status: "indexing_started".to_string(),
        message: format!("Project indexing started: {root}"),
        project_path: root,
        file_extensions: extensions,
        total_projects: registry.len(),
    }))
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default = "default_max_results")]
    max_results: usize,
    #[serde(default = "default_true")]
    include_metadata: bool,
    #[serde(default)]
    project_path: Option<String>,
}

fn default_max_results() -> usize {
    5
}

fn default_true() -> bool {
    true
}

#[derive(Serialize)]
struct QueryMetadata {
    project_root: String,
    indexed_files: usize,
    total_chunks: usize,
    embedding_model: String,
    available_projects: Vec<String>,
}

#[derive(Serialize)]
struct QueryResponse {
    optimized_prompt: String,
    context_chunks: usize,
    token_count: usize,
    cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<QueryMetadata>,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if !(1..=MAX_RESULTS_LIMIT).contains(&req.max_results) {
        return Err(bad_request(format!(
            "max_results must be between 1 and {MAX_RESULTS_LIMIT}"
        )));
    }

    let registry = &state.registry;
    let project = registry.resolve(req.project_path.as_deref())?;
    let outcome = project.query(&req.query, req.max_results).await;

    let metadata = req.include_metadata.then(|| QueryMetadata {
        project_root: project.root().display().to_string(),
        indexed_files: project.indexer().indexed_file_count(),
        total_chunks: project.indexer().total_chunk_count(),
        embedding_model: registry.services().embedding_model.clone(),
        available_projects: project_paths(registry),
    });

    Ok(Json(QueryResponse {
        optimized_prompt: outcome.context,
        context_chunks: outcome.hits.unwrap_or(0),
        token_count: outcome.token_count,
        cached: outcome.cached,
        metadata,
    }))
}

// ============ GET /stats ============

#[derive(Deserialize)]
struct ProjectParam {
    #[serde(default)]
    project_path: Option<String>,
}

#[derive(Serialize)]
struct StatsResponse {
    #[serde(flatten)]
    stats: ProjectStats,
    all_projects: Vec<String>,
}

async fn handle_stats(
    State(state): State<AppState>,
    Query(params): Query<ProjectParam>,
) -> Result<Json<StatsResponse>, AppError> {
    let stats = state.registry.stats(params.project_path.as_deref())?;
    Ok(Json(StatsResponse {
        stats,
        all_projects: project_paths(&state.registry),
    }))
}

// ============ GET /projects ============

#[derive(Serialize)]
struct ProjectEntry {
    path: String,
    name: String,
    indexed_files: usize,
    total_chunks: usize,
    is_current: bool,
}

#[derive(Serialize)]
struct ProjectsResponse {
    total_projects: usize,
    current_project: Option<String>,
    projects: Vec<ProjectEntry>,
}

async fn handle_projects(State(state): State<AppState>) -> Json<ProjectsResponse> {
    let current = state.registry.current();
    let projects: Vec<ProjectEntry> = state
        .registry
        .projects()
        .iter()
        .map(|p| ProjectEntry {
            path: p.root().display().to_string(),
            name: p
                .root()
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            indexed_files: p.indexer().indexed_file_count(),
            total_chunks: p.indexer().total_chunk_count(),
            is_current: current.as_deref() == Some(p.root()),
        })
        .collect();

    Json(ProjectsResponse {
        total_projects: projects.len(),
        current_project: current.map(|p| p.display().to_string()),
        projects,
    })
}

// ============ POST /switch ============

#[derive(Deserialize)]
struct SwitchRequest {
    project_path: String,
}

#[derive(Serialize)]
struct StatusResponse {
    status: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_project: Option<String>,
}

async fn handle_switch(
    State(state): State<AppState>,
    Json(req): Json<SwitchRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    let root = state.registry.switch(&req.project_path)?;
    let root = root.display().to_string();
    Ok(Json(StatusResponse {
        status: "switched".to_string(),
        message: format!("Switched to project: {root}"),
        current_project: Some(root),
    }))
}

// ============ DELETE /clear ============

async fn handle_clear(
    State(state): State<AppState>,
    Query(params): Query<ProjectParam>,
) -> Result<Json<StatusResponse>, AppError> {
    let registry = &state.registry;
    if registry.is_empty() {
        return Ok(Json(StatusResponse {
            status: "no_index".to_string(),
            message: "No index to clear".to_string(),
            current_project: None,
        }));
    }

    let message = match params.project_path.as_deref() {
        Some(raw) => {
            let root = registry.remove(raw).await?;
            format!("Project cleared: {}", root.display())
        }
        None => {
            let n = registry.clear_all().await?;
            format!("All projects cleared ({n})")
        }
    };

    Ok(Json(StatusResponse {
        status: "cleared".to_string(),
        message,
        current_project: registry.current().map(|p| p.display().to_string()),
    }))
}
