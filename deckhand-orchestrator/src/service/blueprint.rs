//! Blueprint Service
//!
//! Catalog operations over the blueprint store.

use std::sync::Arc;

use deckhand_core::domain::blueprint::{Blueprint, BlueprintSummary};
use deckhand_core::dto::blueprint::SearchBlueprints;

use crate::engine::error::EngineError;
use crate::engine::store::BlueprintStore;

/// Service error type
#[derive(Debug)]
pub enum BlueprintError {
    NotFound(String),
    Invalid(String),
}

impl From<EngineError> for BlueprintError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::BlueprintNotFound(name) => BlueprintError::NotFound(name),
            other => BlueprintError::Invalid(other.to_string()),
        }
    }
}

pub fn list_blueprints(
    store: &Arc<BlueprintStore>,
    category: Option<&str>,
) -> Vec<BlueprintSummary> {
    store.list(category)
}

pub fn get_blueprint(
    store: &Arc<BlueprintStore>,
    name: &str,
) -> Result<Arc<Blueprint>, BlueprintError> {
    Ok(store.load(name)?)
}

pub fn search_blueprints(
    store: &Arc<BlueprintStore>,
    request: &SearchBlueprints,
) -> Vec<BlueprintSummary> {
    store.search(request)
}

/// Rescan the backing directory; returns the new catalog size.
pub fn reload_blueprints(store: &Arc<BlueprintStore>) -> Result<usize, BlueprintError> {
    let count = store.reload()?;
    tracing::info!("Blueprint catalog reloaded: {} blueprint(s)", count);
    Ok(count)
}
