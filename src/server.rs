use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::{
    error::ServiceError,
    model::{GenerationRequest, ValidationError, GenerationResponse, InferenceHandler, LifecycleState, ModelMetadata},
};

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<InferenceHandler>,
}

#[derive(Serialize)]
struct MetadataResponse {
    state: LifecycleState,
    model: Option<ModelMetadata>,
}

pub fn build_router(handler: Arc<InferenceHandler>) -> Router {
    let state = AppState { handler };

    Router::new()
        .route("/health", get(health))
        .route("/infer", post(infer))
        .route("/metadata", get(metadata))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}

async fn infer(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<GenerationResponse>, ServiceError> {
    let Json(body) = body.map_err(|rejection| ValidationError::Body(rejection.body_text()))?;
    let request = GenerationRequest::from_json(&body)?;
    debug!(
        prompt_bytes = request.prompt.len(),
        max_new_tokens = request.max_new_tokens,
        "accepted generation request"
    );
    let response = state.handler.infer(request).await?;
    Ok(Json(response))
}

async fn metadata(State(state): State<AppState>) -> Json<MetadataResponse> {
    Json(MetadataResponse {
        state: state.handler.state(),
        model: state.handler.metadata(),
    })
}
