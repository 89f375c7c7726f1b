//! Blueprint domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Target platform for a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Kubernetes,
    Compose,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Kubernetes => write!(f, "kubernetes"),
            Platform::Compose => write!(f, "compose"),
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kubernetes" | "k8s" => Ok(Platform::Kubernetes),
            "compose" | "docker" => Ok(Platform::Compose),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

/// Immutable application template
///
/// Loaded from the blueprint store at startup (or on rescan) and never
/// mutated at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blueprint {
    pub name: String,
    pub category: String,
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub requirements: Requirements,
    /// Direct dependencies by blueprint name. Duplicates are allowed here;
    /// the resolver deduplicates.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Default variable values, overridable per intent.
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
    /// One manifest template per supported platform.
    pub templates: BTreeMap<Platform, String>,
}

impl Blueprint {
    /// Platforms this blueprint can deploy to, derived from which templates
    /// it carries.
    pub fn supported_platforms(&self) -> Vec<Platform> {
        self.templates.keys().copied().collect()
    }

    pub fn supports(&self, platform: Platform) -> bool {
        self.templates.contains_key(&platform)
    }

    pub fn template(&self, platform: Platform) -> Option<&str> {
        self.templates.get(&platform).map(String::as_str)
    }
}

/// Structured needs of a blueprint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Requirements {
    /// Primary service port.
    pub port: Option<u16>,
    /// Persistent storage quantity (Kubernetes-style, e.g. "8Gi").
    pub storage: Option<String>,
    /// Database kind this application needs (e.g. "postgresql"). Satisfied
    /// by a dependency whose category is `database` and kind matches.
    pub database: Option<String>,
    /// Cache kind this application needs (e.g. "redis").
    pub cache: Option<String>,
    pub ingress: Option<IngressRequirement>,
}

impl Requirements {
    pub fn ingress_enabled(&self) -> bool {
        self.ingress.as_ref().is_some_and(|i| i.enabled)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngressRequirement {
    #[serde(default)]
    pub enabled: bool,
    pub port: Option<u16>,
}

/// Lightweight blueprint projection for listing and search results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintSummary {
    pub name: String,
    pub category: String,
    pub version: String,
    pub tags: Vec<String>,
    pub supported_platforms: Vec<Platform>,
    pub dependencies: Vec<String>,
}

impl From<&Blueprint> for BlueprintSummary {
    fn from(blueprint: &Blueprint) -> Self {
        Self {
            name: blueprint.name.clone(),
            category: blueprint.category.clone(),
            version: blueprint.version.clone(),
            tags: blueprint.tags.clone(),
            supported_platforms: blueprint.supported_platforms(),
            dependencies: blueprint.dependencies.clone(),
        }
    }
}
