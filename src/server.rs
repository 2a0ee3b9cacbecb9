//! HTTP JSON API over a shared [`Session`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Health check (returns version) |
//! | `POST` | `/collection/create` | `{path}`: create or re-open a collection |
//! | `POST` | `/collection/load` | `{path}`: open a collection, list its files |
//! | `GET` | `/files` | Files in the current collection |
//! | `POST` | `/files` | `{file_path, collection_path}`: ingest a file from disk |
//! | `DELETE` | `/files/{name}` | Delete a file's chunks from the current collection |
//! | `POST` | `/ask` | `{question, model?, chain_type?, collection_path?, file?}` |
//! | `GET` | `/history` | Chat turns so far |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "duplicate_file", "message": "A file named 'a.txt' already exists in the collection" } }
//! ```
//!
//! Codes: `missing_path`, `invalid_path`, `no_file_chosen`, `no_collection`,
//! `not_initialized`, `invalid_request` (400), `file_not_found` (404),
//! `duplicate_file` (409), `internal` (500).
//!
//! All origins, methods and headers are allowed.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::{classify, VecstoreError};
use crate::progress::{ProgressEvent, RecordingProgress};
use crate::session::{
    AddOutcome, Answer, AskRequest, ChatTurn, ConfiguredProviders, DeleteOutcome, LoadOutcome,
    Providers, Session,
};

#[derive(Clone)]
struct AppState {
    session: Arc<Mutex<Session>>,
}

pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let providers = Arc::new(ConfiguredProviders::new(config));
    run_server_with_providers(config, providers).await
}

/// Like [`run_server`] with caller-supplied embedder and chat providers.
pub async fn run_server_with_providers(
    config: &Config,
    providers: Arc<dyn Providers>,
) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let session = Session::new(config.clone(), providers);
    let app = router(session);

    tracing::info!("vecstore server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// The API routes over `session`, with CORS applied.
pub fn router(session: Session) -> Router {
    let state = AppState {
        session: Arc::new(Mutex::new(session)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/collection/create", post(handle_create))
        .route("/collection/load", post(handle_load))
        .route("/files", get(handle_list_files).post(handle_add_file))
        .route("/files/{name}", delete(handle_delete_file))
        .route("/ask", post(handle_ask))
        .route("/history", get(handle_history))
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

fn status_for(err: &VecstoreError) -> StatusCode {
    match err {
        VecstoreError::DuplicateFile(_) => StatusCode::CONFLICT,
        VecstoreError::FileNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match classify(&err) {
            Some(known) => AppError {
                status: status_for(known),
                code: known.code().to_string(),
                message: known.to_string(),
            },
            None => {
                tracing::error!("request failed: {:#}", err);
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal".to_string(),
                    message: format!("{:#}", err),
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
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Collections ============

#[derive(Deserialize)]
struct PathRequest {
    #[serde(default)]
    path: Option<String>,
}

#[derive(Serialize)]
struct CreateResponse {
    path: String,
    notice: String,
}

async fn handle_create(
    State(state): State<AppState>,
    Json(req): Json<PathRequest>,
) -> Result<Json<CreateResponse>, AppError> {
    let path = req.path.unwrap_or_default();
    let notice = state.session.lock().await.create_collection(&path).await?;
    Ok(Json(CreateResponse {
        path: path.trim().to_string(),
        notice,
    }))
}

async fn handle_load(
    State(state): State<AppState>,
    Json(req): Json<PathRequest>,
) -> Result<Json<LoadOutcome>, AppError> {
    let outcome = state
        .session
        .lock()
        .await
        .load_collection(req.path.as_deref())
        .await?;
    Ok(Json(outcome))
}

// ============ Files ============

#[derive(Serialize)]
struct FilesResponse {
    files: Vec<String>,
}

async fn handle_list_files(
    State(state): State<AppState>,
) -> Result<Json<FilesResponse>, AppError> {
    let files = state.session.lock().await.current_files().await?;
    Ok(Json(FilesResponse { files }))
}

#[derive(Deserialize)]
struct AddFileRequest {
    #[serde(default)]
    file_path: Option<PathBuf>,
    #[serde(default)]
    collection_path: Option<String>,
}

#[derive(Serialize)]
struct AddFileResponse {
    #[serde(flatten)]
    outcome: AddOutcome,
    progress: Vec<ProgressEvent>,
}

async fn handle_add_file(
    State(state): State<AppState>,
    Json(req): Json<AddFileRequest>,
) -> Result<Json<AddFileResponse>, AppError> {
    let progress = RecordingProgress::new();
    let outcome = state
        .session
        .lock()
        .await
        .ingest_file(
            req.collection_path.as_deref(),
            req.file_path.as_deref(),
            &progress,
        )
        .await?;
    Ok(Json(AddFileResponse {
        outcome,
        progress: progress.events(),
    }))
}

#[derive(Serialize)]
struct DeleteFileResponse {
    #[serde(flatten)]
    outcome: DeleteOutcome,
    progress: Vec<ProgressEvent>,
}

async fn handle_delete_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DeleteFileResponse>, AppError> {
    let progress = RecordingProgress::new();
    let outcome = state
        .session
        .lock()
        .await
        .delete_file(&name, &progress)
        .await?;
    Ok(Json(DeleteFileResponse {
        outcome,
        progress: progress.events(),
    }))
}

// ============ Questions ============

/// The answer is returned in full, so the pending slot is resolved before
/// the response goes out.
async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<Answer>, AppError> {
    let mut session = state.session.lock().await;
    let answer = session.ask(&req).await?;
    session.resolve_pending();
    Ok(Json(answer))
}

#[derive(Serialize)]
struct HistoryResponse {
    turns: Vec<ChatTurn>,
}

async fn handle_history(State(state): State<AppState>) -> Json<HistoryResponse> {
    let turns = state.session.lock().await.history().to_vec();
    Json(HistoryResponse { turns })
}
