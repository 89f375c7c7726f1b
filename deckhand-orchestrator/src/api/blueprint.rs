//! Blueprint Catalog API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use deckhand_core::domain::blueprint::{Blueprint, BlueprintSummary};
use deckhand_core::dto::blueprint::SearchBlueprints;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::blueprint as blueprint_service;

#[derive(Debug, Deserialize)]
pub struct ListBlueprintsQuery {
    pub category: Option<String>,
}

/// GET /blueprints
/// List the blueprint catalog, optionally filtered by category
pub async fn list_blueprints(
    State(state): State<AppState>,
    Query(params): Query<ListBlueprintsQuery>,
) -> Json<Vec<BlueprintSummary>> {
    tracing::debug!("Listing blueprints (category: {:?})", params.category);

    Json(blueprint_service::list_blueprints(
        &state.store,
        params.category.as_deref(),
    ))
}

/// GET /blueprints/{name}
/// Get a blueprint by exact name
pub async fn get_blueprint(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Blueprint>> {
    tracing::debug!("Getting blueprint: {}", name);

    let blueprint = blueprint_service::get_blueprint(&state.store, &name)?;

    Ok(Json(blueprint.as_ref().clone()))
}

/// POST /blueprints/search
/// Search the catalog by query string, category, and tags
pub async fn search_blueprints(
    State(state): State<AppState>,
    Json(request): Json<SearchBlueprints>,
) -> Json<Vec<BlueprintSummary>> {
    tracing::debug!("Searching blueprints: {:?}", request.query);

    Json(blueprint_service::search_blueprints(&state.store, &request))
}

/// POST /blueprints/reload
/// Rescan the blueprint store directory
pub async fn reload_blueprints(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let count = blueprint_service::reload_blueprints(&state.store)?;

    Ok(Json(serde_json::json!({ "blueprints": count })))
}
