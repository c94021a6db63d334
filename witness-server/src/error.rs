use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use witness_core::{UnavailableReason, WitnessError};

/// Server-specific error types.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Core error: {0}")]
    CoreError(#[from] WitnessError),

    #[error("Search unavailable ({reason:?}): {detail}")]
    SearchUnavailable { reason: UnavailableReason, detail: String },
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, error_message, reason) = match &self {
            ServerError::BadRequest(reason) => (StatusCode::BAD_REQUEST, format!("Bad request: {}", reason), None),
            ServerError::SearchUnavailable { reason, detail } => {
                error!(reason = ?reason, detail = %detail, "Search unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "Similarity search is temporarily unavailable".to_string(), Some(*reason))
            }
            ServerError::CoreError(core_err) => match core_err {
                WitnessError::NotFound(id) => (StatusCode::NOT_FOUND, format!("Document '{}' not found", id), None),
                WitnessError::AlreadyExists(id) => (StatusCode::CONFLICT, format!("Document '{}' already exists", id), None),
                WitnessError::InvalidArgument(msg) => (StatusCode::BAD_REQUEST, format!("Invalid argument: {}", msg), None),
                WitnessError::DimensionMismatch { expected, actual } => (
                    StatusCode::BAD_REQUEST,
                    format!("Dimension mismatch: expected {}, got {}", expected, actual),
                    None,
                ),
                WitnessError::Embedding(err) => {
                    error!(error = %err, "Embedding failed");
                    (StatusCode::BAD_GATEWAY, format!("Embedding failed: {}", err), Some(UnavailableReason::EmbeddingFailed))
                }
                WitnessError::StoreUnavailable(msg) => {
                    error!(error = %msg, "Document store unavailable");
                    (StatusCode::SERVICE_UNAVAILABLE, "Document store unavailable".to_string(), Some(UnavailableReason::StoreUnavailable))
                }
                WitnessError::Timeout(msg) => {
                    error!(error = %msg, "Operation timed out");
                    (StatusCode::GATEWAY_TIMEOUT, "Operation timed out".to_string(), Some(UnavailableReason::Timeout))
                }
                WitnessError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "Operation cancelled".to_string(), Some(UnavailableReason::Cancelled)),
                WitnessError::IndexNotFound(name) => (StatusCode::NOT_FOUND, format!("Vector index '{}' not found", name), None),
                WitnessError::UnsupportedOperation(msg) => {
                    (StatusCode::NOT_IMPLEMENTED, format!("Operation not supported: {}", msg), None)
                }
                WitnessError::Configuration(msg) => {
                    error!(error = %msg, "Configuration error");
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error (configuration)".to_string(), None)
                }
                WitnessError::IoError { path, source } => {
                    error!(path = ?path, error = %source, "Core I/O error");
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error (I/O)".to_string(), None)
                }
                WitnessError::Serialization(msg) => {
                    error!(error = %msg, "Core serialization error");
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error (Serialization)".to_string(), None)
                }
                WitnessError::Internal(msg) => {
                    error!(error = %msg, "Core internal error");
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string(), None)
                }
            },
        };

        error!("Responding with status {}: {}", status, error_message);

        let body = match reason {
            Some(reason) => Json(json!({ "error": error_message, "reason": reason })),
            None => Json(json!({ "error": error_message })),
        };
        (status, body).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ServerError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (WitnessError::NotFound("id".into()).into(), StatusCode::NOT_FOUND),
            (WitnessError::InvalidArgument("t".into()).into(), StatusCode::BAD_REQUEST),
            (WitnessError::StoreUnavailable("closed".into()).into(), StatusCode::SERVICE_UNAVAILABLE),
            (
                ServerError::SearchUnavailable { reason: UnavailableReason::Timeout, detail: "slow".into() },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
