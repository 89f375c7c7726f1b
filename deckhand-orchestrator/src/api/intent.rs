//! Intent API Handlers
//!
//! HTTP endpoints for intent status, retry, and cancel.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use std::str::FromStr;
use uuid::Uuid;

use deckhand_core::domain::intent::{DeploymentIntent, IntentStatus};
use deckhand_core::dto::intent::IntentDto;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::service::intent as intent_service;

#[derive(Debug, Deserialize)]
pub struct ListIntentsQuery {
    pub status: Option<String>,
}

/// GET /intents
/// List intents, optionally filtered by status
pub async fn list_intents(
    State(state): State<AppState>,
    Query(params): Query<ListIntentsQuery>,
) -> ApiResult<Json<Vec<IntentDto>>> {
    tracing::debug!("Listing intents (status: {:?})", params.status);

    let status = params
        .status
        .as_deref()
        .map(IntentStatus::from_str)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let intents = intent_service::list_intents(&state.pool, status).await?;

    Ok(Json(intents.iter().map(IntentDto::from).collect()))
}

/// GET /intents/{id}
/// Get the full intent record, including plan and execution log
pub async fn get_intent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeploymentIntent>> {
    tracing::debug!("Getting intent: {}", id);

    let intent = intent_service::get_intent(&state.pool, id).await?;

    Ok(Json(intent))
}

/// POST /intents/{id}/retry
/// Re-drive a failed intent from its first incomplete step
pub async fn retry_intent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<IntentDto>> {
    tracing::info!("Retrying intent: {}", id);

    let intent =
        intent_service::retry_intent(&state.pool, &state.store, &state.executors, id).await?;

    Ok(Json(IntentDto::from(&intent)))
}

/// DELETE /intents/{id}
/// Cancel an intent
pub async fn cancel_intent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<IntentDto>> {
    tracing::info!("Cancelling intent: {}", id);

    let intent = intent_service::cancel_intent(&state.pool, id).await?;

    Ok(Json(IntentDto::from(&intent)))
}
