//! HTTP error responses
//!
//! Every failure leaves the gateway as `{"detail": ..., "code": ...}` with a
//! matching status code.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::ws::rejection::WebSocketUpgradeRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use super::protocol::{ErrorBody, ErrorCode, ProtocolError};
use crate::files::FsError;
use crate::process::ProcessError;
use crate::shell::{ManagerError, SessionError};

/// Error returned by HTTP handlers
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: ErrorCode,
    detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            code,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorCode::InvalidRequest, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ErrorCode::NotFound, detail)
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, ErrorCode::Conflict, detail)
    }

    pub fn unauthorized(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, code, detail)
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, ErrorCode::Forbidden, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::InternalError,
            detail,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("{} ({:?})", self.detail, self.code);
        }
        let body = ErrorBody {
            detail: self.detail,
            code: Some(self.code),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ProtocolError> for ApiError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::ValidationError(detail) => Self::bad_request(detail),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(
            rejection.status(),
            ErrorCode::InvalidRequest,
            rejection.body_text(),
        )
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<WebSocketUpgradeRejection> for ApiError {
    fn from(rejection: WebSocketUpgradeRejection) -> Self {
        Self::new(
            rejection.status(),
            ErrorCode::InvalidRequest,
            rejection.body_text(),
        )
    }
}

impl From<FsError> for ApiError {
    fn from(err: FsError) -> Self {
        let detail = err.to_string();
        match err {
            FsError::EmptyPath
            | FsError::InvalidPath
            | FsError::NotADirectory
            | FsError::NotAFile
            | FsError::DirectoryNotEmpty => Self::bad_request(detail),
            FsError::NotFound => Self::not_found(detail),
            FsError::PermissionDenied | FsError::OutsideRoot => Self::forbidden(detail),
            FsError::Io(_) => Self::internal(detail),
        }
    }
}

impl From<ManagerError> for ApiError {
    fn from(err: ManagerError) -> Self {
        let detail = err.to_string();
        match err {
            ManagerError::SessionNotFound(_) => Self::not_found(detail),
            ManagerError::SessionExists(_) => Self::conflict(detail),
            ManagerError::InvalidSessionId(_) => Self::bad_request(detail),
            ManagerError::Session(SessionError::InvalidPath(_)) => Self::bad_request(detail),
            ManagerError::Session(SessionError::NotRunning) => Self::conflict(detail),
            ManagerError::Session(SessionError::SpawnFailed(_)) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::SpawnFailed,
                detail,
            ),
            ManagerError::Session(SessionError::PtyError(_)) => Self::internal(detail),
        }
    }
}

impl From<ProcessError> for ApiError {
    fn from(err: ProcessError) -> Self {
        let detail = err.to_string();
        match err {
            ProcessError::NotFound(_) => Self::not_found(detail),
            ProcessError::AlreadyExists(_) => Self::conflict(detail),
            ProcessError::InvalidSpec(_) => Self::bad_request(detail),
            ProcessError::WorkingDir(_) => Self::internal(detail),
            ProcessError::Spawn(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::SpawnFailed,
                detail,
            ),
        }
    }
}

/// Result type for HTTP handlers
pub type ApiResult<T> = Result<T, ApiError>;
