//! Deployment Submission API Handlers

use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use deckhand_core::dto::deploy::SubmitDeployment;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::intent as intent_service;

#[derive(Debug, Deserialize)]
pub struct DeployQuery {
    #[serde(default)]
    pub dry_run: bool,
}

/// POST /deploy
/// Submit a deployment command. With `?dry_run=true` the pipeline runs
/// through manifest generation and returns the would-be manifests without
/// touching the platform or persisting an intent.
pub async fn deploy(
    State(state): State<AppState>,
    Query(query): Query<DeployQuery>,
    Json(request): Json<SubmitDeployment>,
) -> ApiResult<Response> {
    tracing::info!(
        "Deployment request: \"{}\" (dry_run: {})",
        request.command,
        query.dry_run
    );

    if query.dry_run {
        let report = intent_service::dry_run(&state.store, request)?;
        return Ok(Json(report).into_response());
    }

    let submitted =
        intent_service::submit(&state.pool, &state.store, &state.executors, request).await?;

    Ok(Json(submitted).into_response())
}
