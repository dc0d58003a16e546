//! API error types and HTTP response mapping
//!
//! The webhook provider only ever sees an HTTP status and a small JSON body
//! `{success, message}`; internal error detail stays in the logs.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request content: wrong content type, unparsable JSON, or a
    /// payload that failed normalization
    #[error("{0}")]
    Validation(String),

    /// Missing/invalid signature or stale timestamp
    #[error("{0}")]
    Unauthorized(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    /// Server-side misconfiguration or reconciliation failure
    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ErrorBody {
            success: false,
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
