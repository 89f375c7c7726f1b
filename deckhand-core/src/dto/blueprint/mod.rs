//! Blueprint catalog DTOs

use serde::{Deserialize, Serialize};

/// Request body for blueprint search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchBlueprints {
    pub query: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}
