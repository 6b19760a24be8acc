use axum::{http::StatusCode, response::{IntoResponse, Json, Response}};
use serde_json::json;
use thiserror::Error;

/// Field-level validation failure, surfaced verbatim in a 422 response.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("input validation failed")]
    InvalidInput(Vec<FieldError>),

    #[error("sensitive-data failure: {0}")]
    SensitiveDataFailure(String),

    #[error("reference-store failure: {0}")]
    ReferenceStoreFailure(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for RiskError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            RiskError::InvalidInput(fields) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "success": false, "error": "invalid_input", "fields": fields }),
            ),
            RiskError::SensitiveDataFailure(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "success": false, "error": "internal_error" }),
            ),
            RiskError::ReferenceStoreFailure(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "success": false, "error": "internal_error" }),
            ),
            RiskError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "success": false, "error": "internal_error" }),
            ),
        };
        // Sensitive-data and internal failures are logged with detail server-side only;
        // the response body never carries collaborator error text.
        tracing::error!(error = %self, "request failed");
        (status, Json(body)).into_response()
    }
}

pub type RiskResult<T> = Result<T, RiskError>;
