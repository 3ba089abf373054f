//! HTTP request handlers
//!
//! Thin adapters between axum extractors and the filesystem, shell and
//! process services.

use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use tracing::debug;

use super::error::{ApiError, ApiResult};
use super::extract::{ApiJson, ApiQuery};
use super::protocol::{
    validate_id, ContentResponse, CreateProcessRequest, InputRequest, LogsResponse, PathQuery,
    ProcessInfo, ResizeRequest, SessionInfo, StatusResponse, WriteFileBody,
};
use super::routes::AppState;
use crate::files::DirEntry;
use crate::process::ProcessSpec;

// ============================================================================
// Health
// ============================================================================

/// `GET /`
pub async fn health() -> Json<StatusResponse> {
    Json(StatusResponse::running())
}

// ============================================================================
// Filesystem
// ============================================================================

/// `GET /files?path=`
pub async fn list_files(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PathQuery>,
) -> ApiResult<Json<Vec<DirEntry>>> {
    Ok(Json(state.explorer.list(&query.path).await?))
}

/// `GET /file?path=`
pub async fn read_file(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PathQuery>,
) -> ApiResult<Json<ContentResponse>> {
    let content = state.explorer.read(&query.path).await?;
    Ok(Json(ContentResponse { content }))
}

/// `POST /file?path=[&content=]`
///
/// Content comes from the query string when present, otherwise from a JSON
/// body `{"content": ...}`. No content at all writes an empty file.
pub async fn write_file(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PathQuery>,
    body: Bytes,
) -> ApiResult<Json<StatusResponse>> {
    let content = match query.content {
        Some(content) => content,
        None if body.is_empty() => String::new(),
        None => {
            let body: WriteFileBody = serde_json::from_slice(&body)
                .map_err(|e| ApiError::bad_request(format!("Invalid body: {}", e)))?;
            body.content
        }
    };

    state.explorer.write(&query.path, &content).await?;
    Ok(Json(StatusResponse::new("saved")))
}

/// `POST /mkdir?path=`
pub async fn make_dir(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PathQuery>,
) -> ApiResult<Json<StatusResponse>> {
    state.explorer.mkdir(&query.path).await?;
    Ok(Json(StatusResponse::new("created")))
}

/// `DELETE /file?path=`
pub async fn delete_file(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PathQuery>,
) -> ApiResult<Json<StatusResponse>> {
    state.explorer.delete(&query.path).await?;
    Ok(Json(StatusResponse::new("deleted")))
}

// ============================================================================
// Terminal sessions
// ============================================================================

/// `GET /sessions`
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.shells.list().await)
}

/// `POST /sessions/{id}/resize`
pub async fn resize_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    ApiJson(request): ApiJson<ResizeRequest>,
) -> ApiResult<Json<StatusResponse>> {
    request.validate()?;
    state
        .shells
        .resize(&session_id, request.cols, request.rows)
        .await?;
    Ok(Json(StatusResponse::new("resized")))
}

/// `DELETE /sessions/{id}`
pub async fn close_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    state.shells.close(&session_id).await?;
    Ok(Json(StatusResponse::new("closed")))
}

// ============================================================================
// Managed processes
// ============================================================================

/// `GET /processes`
pub async fn list_processes(State(state): State<AppState>) -> Json<Vec<ProcessInfo>> {
    Json(state.processes.list().await)
}

/// `POST /processes`
pub async fn create_process(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateProcessRequest>,
) -> ApiResult<Json<ProcessInfo>> {
    request.validate()?;
    debug!("Creating process '{}'", request.id);
    let info = state.processes.create(ProcessSpec::from(request)).await?;
    Ok(Json(info))
}

/// `GET /processes/{id}`
pub async fn get_process(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ProcessInfo>> {
    validate_id("process id", &id)?;
    Ok(Json(state.processes.get(&id).await?))
}

/// `POST /processes/{id}/start`
pub async fn start_process(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ProcessInfo>> {
    validate_id("process id", &id)?;
    Ok(Json(state.processes.start(&id).await?))
}

/// `POST /processes/{id}/stop`
pub async fn stop_process(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ProcessInfo>> {
    validate_id("process id", &id)?;
    Ok(Json(state.processes.stop(&id).await?))
}

/// `POST /processes/{id}/input`
pub async fn process_input(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<InputRequest>,
) -> ApiResult<Json<StatusResponse>> {
    validate_id("process id", &id)?;
    request.validate()?;
    state.processes.send_input(&id, &request.input).await?;
    Ok(Json(StatusResponse::new("sent")))
}

/// `GET /processes/{id}/logs`
pub async fn process_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<LogsResponse>> {
    validate_id("process id", &id)?;
    let lines = state.processes.logs(&id).await?;
    Ok(Json(LogsResponse { id, lines }))
}
