//! Deployment submission DTOs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::blueprint::Platform;
use crate::domain::intent::ParsedIntent;

/// Request to submit a deployment command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitDeployment {
    pub command: String,
    #[serde(default)]
    pub options: Option<DeployOptions>,
}

/// Structured overrides accompanying a command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployOptions {
    pub platform: Option<Platform>,
    pub namespace: Option<String>,
    pub domain: Option<String>,
    pub image: Option<String>,
    /// Extra variable overrides applied on top of parsed parameters.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// Response to an accepted submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploySubmitted {
    pub intent_id: Uuid,
    pub application: String,
    pub confidence: f64,
}

/// Rendered output of a dry run: parsing, resolution and generation ran,
/// the platform executor did not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DryRunReport {
    pub parsed: ParsedIntent,
    pub platform: Platform,
    pub namespace: String,
    pub plan: Vec<DryRunEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DryRunEntry {
    pub blueprint_name: String,
    pub manifests: Vec<String>,
}
