//! Mapping of service errors onto HTTP responses.
//!
//! Every error body has the shape `{"error": {"code": ..., "message": ...}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use reviewer_core::ServiceError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The request could not be decoded or lacked a required parameter.
    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Service(e) => match e {
                ServiceError::Validation(_) | ServiceError::TeamExists(_) => {
                    StatusCode::BAD_REQUEST
                }
                ServiceError::AuthorNotFound(_) | ServiceError::NotFound { .. } => {
                    StatusCode::NOT_FOUND
                }
                ServiceError::DuplicateId(_)
                | ServiceError::PrMerged(_)
                | ServiceError::NotAssigned { .. }
                | ServiceError::NoCandidate { .. }
                | ServiceError::ConcurrentModification(_) => StatusCode::CONFLICT,
                ServiceError::StorageUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "INVALID_REQUEST",
            ApiError::Service(e) => e.code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Service(ServiceError::StorageUnavailable(e)) => {
                tracing::error!("Storage failure: {}", e);
                "storage unavailable".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}
