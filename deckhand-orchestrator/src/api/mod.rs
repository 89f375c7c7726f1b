//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod blueprint;
pub mod deploy;
pub mod error;
pub mod health;
pub mod intent;

use axum::{
    Router,
    routing::{delete, get, post},
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::engine::platform::ExecutorSet;
use crate::engine::store::BlueprintStore;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub store: Arc<BlueprintStore>,
    pub executors: ExecutorSet,
}

/// Create the main API router with all endpoints
pub fn create_router(pool: PgPool, store: Arc<BlueprintStore>, executors: ExecutorSet) -> Router {
    let state = AppState {
        pool,
        store,
        executors,
    };

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Deployment submission
        .route("/deploy", post(deploy::deploy))
        // Intent endpoints
        .route("/intents", get(intent::list_intents))
        .route("/intents/{id}", get(intent::get_intent))
        .route("/intents/{id}", delete(intent::cancel_intent))
        .route("/intents/{id}/retry", post(intent::retry_intent))
        // Blueprint catalog endpoints
        .route("/blueprints", get(blueprint::list_blueprints))
        .route("/blueprints/search", post(blueprint::search_blueprints))
        .route("/blueprints/reload", post(blueprint::reload_blueprints))
        .route("/blueprints/{name}", get(blueprint::get_blueprint))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
