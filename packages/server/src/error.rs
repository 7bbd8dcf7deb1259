use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::MediaError;
use common::catalog::CatalogError;
use common::storage::StorageError;
use sea_orm::DbErr;
use serde::Serialize;

use crate::ingest::IngestError;

/// Structured error response returned by all endpoints on failure.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code. One of: `VALIDATION_ERROR`, `NOT_FOUND`,
    /// `CONFLICT`, `INTERNAL_ERROR`.
    #[schema(example = "VALIDATION_ERROR")]
    pub code: &'static str,
    /// Human-readable error description.
    #[schema(example = "Unsupported content type: text/plain")]
    pub message: String,
}

/// Application-level error type. The variant picks the status and code;
/// the message is shown to the client except for `Internal`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = match self {
            AppError::Internal(detail) => {
                tracing::error!(%detail, "Request failed");
                "An unexpected error occurred".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorBody { code, message })).into_response()
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => AppError::NotFound("Content not found".into()),
            StorageError::SizeLimitExceeded { actual, limit } => AppError::Validation(format!(
                "File is {actual} bytes; the limit is {limit} bytes"
            )),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::FilenameTaken(name) => {
                AppError::Conflict(format!("Filename '{name}' is already in use"))
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::NotFound(key) => AppError::NotFound(format!("No image with {key}")),
            MediaError::Storage(e) => e.into(),
            MediaError::Catalog(e) => e.into(),
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Invalid(msg) => AppError::Validation(msg),
            IngestError::Media(e) => e.into(),
            e @ IngestError::Publish { .. } => AppError::Internal(e.to_string()),
        }
    }
}
