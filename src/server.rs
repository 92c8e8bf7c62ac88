//! HTTP server.
//!
//! Exposes indexing, question answering and the document workflows as a
//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version and chunk count) |
//! | `POST` | `/ask` | `{ "question": "..." }` → answer with sources |
//! | `POST` | `/index` | Index the ingestion directory → run report |
//! | `POST` | `/upload/{kind}?filename=…&project=…` | Raw body upload (`transcript`, `codebase`, `wireframe`) |
//! | `POST` | `/generate/{doc_type}` | Generate a document from a template |
//! | `GET`  | `/templates` | Catalog summary plus full catalog |
//! | `GET`  | `/templates/{doc_type}` | Templates of one document type |
//! | `POST` | `/validate/{doc_id}` | Validate a document's content |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "retrieval_empty", "message": "knowledge base is empty: ..." } }
//! ```
//!
//! Codes come from [`PipelineError::code`], plus `not_found` (404) and
//! `internal` (500).
//!
//! # Concurrency
//!
//! Index runs hold the write half of a `tokio::sync::RwLock`; questions and
//! generation hold the read half, so they never interleave with a flush.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::error::PipelineError;
use crate::generate::{generate_document, GenerateRequest};
use crate::generation::{create_generator, Generator};
use crate::index::{run_index, CancelFlag};
use crate::models::SourceRef;
use crate::progress::NoProgress;
use crate::query::QueryEngine;
use crate::store::{SqliteVectorStore, VectorStore};
use crate::templates::TemplateCatalog;
use crate::upload::{store_upload, UploadKind};
use crate::validate::{validate_request, ValidationRequest};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    catalog: Arc<TemplateCatalog>,
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    engine: QueryEngine,
    index_lock: Arc<RwLock<()>>,
}

impl AppState {
    pub fn new(
        config: Config,
        catalog: TemplateCatalog,
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        let engine = QueryEngine::new(
            provider.clone(),
            store.clone(),
            generator,
            &config.retrieval,
            &config.generation,
        );
        Self {
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            provider,
            store,
            engine,
            index_lock: Arc::new(RwLock::new(())),
        }
    }

    /// Builds providers, the SQLite store and the template catalog from
    /// configuration.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let provider = create_provider(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        let store = SqliteVectorStore::open(&config.store.dir).await?;
        let catalog = TemplateCatalog::load(config.templates.path.as_deref())?;
        Ok(Self::new(
            config.clone(),
            catalog,
            provider,
            Arc::new(store),
            generator,
        ))
    }
}

/// Routes with CORS and the upload body limit applied.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = DefaultBodyLimit::max(state.config.server.max_upload_bytes);

    Router::new()
        .route("/health", get(handle_health))
        .route("/ask", post(handle_ask))
        .route("/index", post(handle_index))
        .route("/upload/{kind}", post(handle_upload))
        .route("/generate/{doc_type}", post(handle_generate))
        .route("/templates", get(handle_templates))
        .route("/templates/{doc_type}", get(handle_templates_for_type))
        .route("/validate/{doc_id}", post(handle_validate))
        .layer(body_limit)
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let app = router(state);

    let bind_addr = &config.server.bind;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(bind = %bind_addr, "server listening");
    println!("docassist listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

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

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
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

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::InvalidRequest(_)
            | PipelineError::UnsupportedFormat { .. }
            | PipelineError::ConversionFailure { .. } => StatusCode::BAD_REQUEST,
            PipelineError::RetrievalEmpty | PipelineError::ModelMismatch { .. } => {
                StatusCode::CONFLICT
            }
            PipelineError::EmbeddingFailure { .. } | PipelineError::GenerationFailure { .. } => {
                StatusCode::BAD_GATEWAY
            }
            PipelineError::StoreUnavailable { .. } | PipelineError::Cancelled => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<PipelineError>() {
            Ok(pipeline) => pipeline.into(),
            Err(other) => {
                tracing::error!(error = %format!("{:#}", other), "request failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal".to_string(),
                    message: format!("{:#}", other),
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
    chunks: usize,
}

async fn handle_health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        chunks: state.store.count().await?,
    }))
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    sources: Vec<SourceRef>,
    dropped_chunks: usize,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let _guard = state.index_lock.read().await;
    let answer = state.engine.ask(&req.question).await?;
    Ok(Json(AskResponse {
        answer: answer.text,
        sources: answer.sources,
        dropped_chunks: answer.dropped_chunks,
    }))
}

// ============ POST /index ============

async fn handle_index(State(state): State<AppState>) -> Result<Response, AppError> {
    let _guard = state.index_lock.write().await;
    let report = run_index(
        &state.config,
        state.provider.as_ref(),
        state.store.as_ref(),
        CancelFlag::new(),
        &NoProgress,
    )
    .await?;
    Ok(Json(report).into_response())
}

// ============ POST /upload/{kind} ============

#[derive(Deserialize)]
struct UploadParams {
    filename: String,
    #[serde(default)]
    project: Option<String>,
}

async fn handle_upload(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<Response, AppError> {
    let kind: UploadKind = kind.parse()?;
    if body.is_empty() {
        return Err(PipelineError::InvalidRequest("upload body is empty".to_string()).into());
    }

    let ingest_dir = state.config.ingest.dir.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        store_upload(
            &ingest_dir,
            kind,
            &params.filename,
            &body,
            params.project.as_deref(),
        )
    })
    .await
    .map_err(anyhow::Error::from)??;

    Ok((StatusCode::CREATED, Json(outcome)).into_response())
}

// ============ POST /generate/{doc_type} ============

async fn handle_generate(
    State(state): State<AppState>,
    Path(doc_type): Path<String>,
    Json(req): Json<GenerateRequest>,
) -> Result<Response, AppError> {
    if state.catalog.templates(&doc_type).is_none() {
        return Err(unknown_type(&state.catalog, &doc_type));
    }
    let _guard = state.index_lock.read().await;
    let document = generate_document(&state.engine, &state.catalog, &doc_type, &req).await?;
    Ok(Json(document).into_response())
}

// ============ GET /templates ============

async fn handle_templates(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "total_templates": state.catalog.total(),
        "document_types": state.catalog.summary(),
        "full_templates": state.catalog.as_ref(),
    }))
}

async fn handle_templates_for_type(
    State(state): State<AppState>,
    Path(doc_type): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let templates = state
        .catalog
        .templates(&doc_type)
        .ok_or_else(|| unknown_type(&state.catalog, &doc_type))?;
    Ok(Json(serde_json::json!({
        "document_type": doc_type,
        "templates": templates,
        "count": templates.len(),
    })))
}

fn unknown_type(catalog: &TemplateCatalog, doc_type: &str) -> AppError {
    not_found(format!(
        "Document type '{}' not found. Available types: {}",
        doc_type,
        catalog.doc_types().join(", ")
    ))
}

// ============ POST /validate/{doc_id} ============

async fn handle_validate(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
    Json(req): Json<ValidationRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let report = validate_request(&state.catalog, &req)?;
    tracing::info!(doc_id = %doc_id, score = report.score, "document validated");
    Ok(Json(serde_json::json!({
        "document_id": doc_id,
        "document_type": req.document_type,
        "validation": report,
    })))
}
