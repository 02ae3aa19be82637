use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::{engine::EngineError, model::ValidationError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),
    #[error("engine initialization failed: {0}")]
    Initialization(#[source] EngineError),
    #[error("generation failed: {0}")]
    Generation(#[source] EngineError),
    #[error("handler is not initialized")]
    NotInitialized,
    #[error("handler has been finalized")]
    Finalized,
    #[error("handler is already initialized")]
    AlreadyInitialized,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotInitialized | ServiceError::Finalized => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServiceError::Initialization(_)
            | ServiceError::Generation(_)
            | ServiceError::AlreadyInitialized => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}
