//! API Error Handling
//!
//! Unified error types and conversion for API responses. Service errors
//! map onto HTTP statuses in one place so handlers can use `?`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::service::{blueprint::BlueprintError, intent::IntentError};

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    DatabaseError(sqlx::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DatabaseError(err)
    }
}

impl From<IntentError> for ApiError {
    fn from(err: IntentError) -> Self {
        match err {
            IntentError::NotFound(id) => {
                ApiError::NotFound(format!("Intent {} not found", id))
            }
            IntentError::InvalidState(msg) => ApiError::BadRequest(msg),
            IntentError::Conflict(msg) => ApiError::Conflict(msg),
            // Engine errors at submission time are configuration problems
            // with the request or the catalog, not server faults.
            IntentError::Engine(e) => ApiError::BadRequest(e.to_string()),
            IntentError::DatabaseError(e) => ApiError::DatabaseError(e),
        }
    }
}

impl From<BlueprintError> for ApiError {
    fn from(err: BlueprintError) -> Self {
        match err {
            BlueprintError::NotFound(name) => {
                ApiError::NotFound(format!("Blueprint {} not found", name))
            }
            BlueprintError::Invalid(msg) => ApiError::BadRequest(msg),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
