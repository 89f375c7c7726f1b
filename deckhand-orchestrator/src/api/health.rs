//! Health Check API Handler
//!
//! Reports the blueprint catalog size so an operator can tell whether the
//! store scan succeeded.

use axum::{Json, extract::State};

use crate::api::AppState;

/// GET /health
/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "blueprints": state.store.len(),
    }))
}
