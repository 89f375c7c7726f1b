//! Blueprint repository
//!
//! Loads, validates, and indexes application templates from a directory of
//! YAML documents. Blueprints are looked up by exact name; fuzzy matching
//! is the intent parser's job. The store can be rescanned at runtime to
//! pick up new or changed documents.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use deckhand_core::domain::blueprint::{Blueprint, BlueprintSummary, Platform, Requirements};
use deckhand_core::dto::blueprint::SearchBlueprints;

use crate::engine::error::{EngineError, Result};
use crate::engine::manifest;

/// On-disk blueprint document (`metadata` envelope wire format).
#[derive(Debug, Deserialize)]
struct BlueprintDocument {
    metadata: BlueprintMetadata,
    #[serde(default)]
    requirements: Requirements,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    defaults: BTreeMap<String, String>,
    templates: BTreeMap<Platform, String>,
}

#[derive(Debug, Deserialize)]
struct BlueprintMetadata {
    name: String,
    category: String,
    version: String,
    #[serde(default)]
    tags: Vec<String>,
}

impl From<BlueprintDocument> for Blueprint {
    fn from(doc: BlueprintDocument) -> Self {
        Blueprint {
            name: doc.metadata.name,
            category: doc.metadata.category,
            version: doc.metadata.version,
            tags: doc.metadata.tags,
            requirements: doc.requirements,
            dependencies: doc.dependencies,
            defaults: doc.defaults,
            templates: doc.templates,
        }
    }
}

/// Indexed, validated blueprint collection.
pub struct BlueprintStore {
    dir: Option<PathBuf>,
    blueprints: RwLock<BTreeMap<String, Arc<Blueprint>>>,
}

impl BlueprintStore {
    /// Scan a directory for `*.yaml`/`*.yml` blueprint documents.
    pub fn scan(dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self {
            dir: Some(dir.into()),
            blueprints: RwLock::new(BTreeMap::new()),
        };
        store.reload()?;
        Ok(store)
    }

    /// Build a store from in-memory blueprints (tests, embedded catalogs).
    pub fn from_blueprints(blueprints: Vec<Blueprint>) -> Result<Self> {
        let mut index = BTreeMap::new();
        for blueprint in blueprints {
            validate(&blueprint)?;
            index.insert(blueprint.name.clone(), Arc::new(blueprint));
        }

        Ok(Self {
            dir: None,
            blueprints: RwLock::new(index),
        })
    }

    /// Rescan the backing directory. Returns the number of blueprints
    /// indexed. A single invalid document fails the whole rescan so a bad
    /// edit cannot silently drop a blueprint from the catalog.
    pub fn reload(&self) -> Result<usize> {
        let Some(dir) = &self.dir else {
            return Ok(self.blueprints.read().unwrap().len());
        };

        let mut index = BTreeMap::new();

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_yaml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "yaml" || ext == "yml");
            if !is_yaml {
                continue;
            }

            let raw = std::fs::read_to_string(&path)?;
            let doc: BlueprintDocument =
                serde_yaml::from_str(&raw).map_err(|e| EngineError::BlueprintInvalid {
                    name: path.display().to_string(),
                    reason: e.to_string(),
                })?;

            let blueprint = Blueprint::from(doc);
            validate(&blueprint)?;

            tracing::debug!("Loaded blueprint {} from {}", blueprint.name, path.display());
            index.insert(blueprint.name.clone(), Arc::new(blueprint));
        }

        // Dangling dependency names surface at resolve time; flag them
        // early for operators.
        for blueprint in index.values() {
            for dep in &blueprint.dependencies {
                if !index.contains_key(dep) {
                    tracing::warn!(
                        "Blueprint {} depends on {}, which is not in the store",
                        blueprint.name,
                        dep
                    );
                }
            }
        }

        let count = index.len();
        *self.blueprints.write().unwrap() = index;

        tracing::info!("Blueprint store indexed {} blueprint(s)", count);
        Ok(count)
    }

    /// Exact-name lookup.
    pub fn load(&self, name: &str) -> Result<Arc<Blueprint>> {
        self.blueprints
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::BlueprintNotFound(name.to_string()))
    }

    pub fn list(&self, category: Option<&str>) -> Vec<BlueprintSummary> {
        self.blueprints
            .read()
            .unwrap()
            .values()
            .filter(|b| category.is_none_or(|c| b.category == c))
            .map(|b| BlueprintSummary::from(b.as_ref()))
            .collect()
    }

    pub fn search(&self, request: &SearchBlueprints) -> Vec<BlueprintSummary> {
        let query = request.query.as_deref().map(str::to_lowercase);

        self.blueprints
            .read()
            .unwrap()
            .values()
            .filter(|b| request.category.as_deref().is_none_or(|c| b.category == c))
            .filter(|b| request.tags.iter().all(|tag| b.tags.contains(tag)))
            .filter(|b| {
                query.as_deref().is_none_or(|q| {
                    b.name.to_lowercase().contains(q)
                        || b.category.to_lowercase().contains(q)
                        || b.tags.iter().any(|t| t.to_lowercase().contains(q))
                })
            })
            .map(|b| BlueprintSummary::from(b.as_ref()))
            .collect()
    }

    /// Direct dependencies only; the resolver handles transitive expansion.
    pub fn dependencies_of(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.load(name)?.dependencies.clone())
    }

    /// All indexed names, used by the intent parser for application matching.
    pub fn names(&self) -> Vec<String> {
        self.blueprints.read().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.blueprints.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blueprints.read().unwrap().is_empty()
    }
}

/// The variables a blueprint's templates may legitimately reference: the
/// standard injected set, its declared defaults, and the variables implied
/// by its requirements (which auto-wiring synthesizes).
pub fn allowed_variables(blueprint: &Blueprint) -> BTreeSet<String> {
    let mut allowed: BTreeSet<String> = [
        "app_name",
        "namespace",
        "image",
        "service_name",
        "replicas",
        "secret_key",
        "admin_password",
    ]
    .into_iter()
    .map(String::from)
    .collect();

    allowed.extend(blueprint.defaults.keys().cloned());

    let requirements = &blueprint.requirements;
    if requirements.port.is_some() {
        allowed.insert("port".to_string());
    }
    if requirements.storage.is_some() {
        allowed.insert("storage".to_string());
    }
    if requirements.database.is_some() {
        allowed.extend(
            [
                "DATABASE_HOST",
                "DATABASE_PORT",
                "DATABASE_NAME",
                "DATABASE_USER",
                "DATABASE_PASSWORD",
                "DATABASE_URL",
            ]
            .into_iter()
            .map(String::from),
        );
    }
    if requirements.cache.is_some() {
        allowed.insert("CACHE_HOST".to_string());
        allowed.insert("CACHE_PORT".to_string());
    }
    if requirements.ingress_enabled() {
        allowed.insert("domain".to_string());
        allowed.insert("tls_secret_name".to_string());
        allowed.insert("cert_issuer".to_string());
    }

    allowed
}

/// Every template may reference only variables the engine can resolve.
fn validate(blueprint: &Blueprint) -> Result<()> {
    if blueprint.name.trim().is_empty() {
        return Err(EngineError::BlueprintInvalid {
            name: "<unnamed>".to_string(),
            reason: "blueprint name cannot be empty".to_string(),
        });
    }
    if blueprint.templates.is_empty() {
        return Err(EngineError::BlueprintInvalid {
            name: blueprint.name.clone(),
            reason: "blueprint has no platform templates".to_string(),
        });
    }

    let allowed = allowed_variables(blueprint);

    for (platform, template) in &blueprint.templates {
        for placeholder in manifest::placeholders(template) {
            if !allowed.contains(&placeholder) {
                return Err(EngineError::BlueprintInvalid {
                    name: blueprint.name.clone(),
                    reason: format!(
                        "{} template references unknown variable {}",
                        platform, placeholder
                    ),
                });
            }
        }
    }

    Ok(())
}
