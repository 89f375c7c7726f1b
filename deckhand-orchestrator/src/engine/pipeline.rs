//! Deployment planning
//!
//! Pure composition of the resolver, auto-wiring, and manifest stages:
//! turns a parsed intent into an ordered plan with fully rendered
//! manifests. No I/O happens here; the worker persists around it and dry
//! runs call it directly with an ephemeral secret bag.

use std::collections::{BTreeMap, BTreeSet};

use deckhand_core::domain::blueprint::Platform;
use deckhand_core::domain::intent::{IntentAction, ParsedIntent, PlanEntry};
use deckhand_core::domain::variables::ResolvedVariables;

use crate::engine::error::{EngineError, Result};
use crate::engine::secrets::SecretBag;
use crate::engine::store::BlueprintStore;
use crate::engine::wiring::{self, WiredNode};
use crate::engine::{manifest, resolver};

/// Output of the planning stages for one intent.
#[derive(Debug)]
pub struct PlannedDeployment {
    pub plan: Vec<PlanEntry>,
    pub resolved_variables: BTreeMap<String, ResolvedVariables>,
}

/// Compute the resolution order for an intent. A scale touches only the
/// existing workload; a remove still resolves the full graph (its wiring
/// context is needed to render the root) but only the root is planned.
pub fn resolution_order(
    store: &BlueprintStore,
    parsed: &ParsedIntent,
) -> Result<Vec<String>> {
    match parsed.action {
        IntentAction::Scale => {
            store.load(&parsed.application)?;
            Ok(vec![parsed.application.clone()])
        }
        _ => resolver::resolve(store, &parsed.application),
    }
}

/// Wire and render every node of the plan, in resolution order.
pub fn plan_deployment(
    store: &BlueprintStore,
    platform: Platform,
    namespace: &str,
    parsed: &ParsedIntent,
    order: &[String],
    secrets: &mut SecretBag,
) -> Result<PlannedDeployment> {
    // A scale touches only the existing workload; there is nothing to
    // render.
    if parsed.action == IntentAction::Scale {
        return Ok(PlannedDeployment {
            plan: vec![PlanEntry::new(parsed.application.clone(), vec![])],
            resolved_variables: BTreeMap::new(),
        });
    }

    let root = parsed.application.as_str();
    let overrides = parsed.parameters.clone();

    let mut upstream: BTreeMap<String, WiredNode> = BTreeMap::new();
    let mut resolved_variables = BTreeMap::new();
    let mut plan = Vec::with_capacity(order.len());

    for name in order {
        let blueprint = store.load(name)?;
        let template = blueprint.template(platform).ok_or_else(|| {
            EngineError::PlatformUnsupported {
                blueprint: name.clone(),
                platform: platform.to_string(),
            }
        })?;

        // Intent-level overrides apply to the target application; its
        // dependencies deploy with their own defaults.
        let node_overrides = if name == root {
            overrides.clone()
        } else {
            BTreeMap::new()
        };

        let (variables, node) = wiring::wire_node(
            &blueprint,
            platform,
            namespace,
            &node_overrides,
            &upstream,
            secrets,
        )?;

        let manifests = manifest::render(name, template, platform, &variables, secrets)?;

        resolved_variables.insert(name.clone(), variables);
        upstream.insert(name.clone(), node);

        // A remove only ever acts on the target application; dependencies
        // may be shared with other deployments and are left in place.
        if parsed.action != IntentAction::Remove || name == root {
            plan.push(PlanEntry::new(name.clone(), manifests));
        }
    }

    Ok(PlannedDeployment {
        plan,
        resolved_variables,
    })
}

/// Providers that some later node's wiring consumes (database or cache
/// requirements). A readiness timeout on one of these fails the intent; on
/// anything else it is only a warning. Recomputed from the store on
/// resume, so a retried intent keeps the same hard/soft classification.
pub fn hard_dependencies(store: &BlueprintStore, order: &[String]) -> Result<BTreeSet<String>> {
    let mut hard = BTreeSet::new();

    for (position, name) in order.iter().enumerate() {
        let blueprint = store.load(name)?;
        let earlier = &order[..position];

        for kind in [&blueprint.requirements.database, &blueprint.requirements.cache]
            .into_iter()
            .flatten()
        {
            if let Some(provider) = earlier.iter().find(|candidate| *candidate == kind) {
                hard.insert(provider.clone());
            } else if let Some(provider) = earlier.iter().find(|candidate| {
                store
                    .load(candidate)
                    .map(|b| b.category == "database" || b.category == "cache")
                    .unwrap_or(false)
            }) {
                hard.insert(provider.clone());
            }
        }
    }

    Ok(hard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckhand_core::domain::blueprint::{Blueprint, Requirements};
    use deckhand_core::domain::variables::VarValue;

    fn catalog() -> BlueprintStore {
        let postgresql = Blueprint {
            name: "postgresql".to_string(),
            category: "database".to_string(),
            version: "16".to_string(),
            tags: vec![],
            requirements: Requirements {
                port: Some(5432),
                storage: Some("8Gi".to_string()),
                ..Default::default()
            },
            dependencies: vec![],
            defaults: BTreeMap::from([
                ("image".to_string(), "postgres:16".to_string()),
                ("database_user".to_string(), "postgres".to_string()),
            ]),
            templates: BTreeMap::from([(
                Platform::Kubernetes,
                concat!(
                    "kind: Secret\nmetadata:\n  name: {{app_name}}-secrets\n",
                    "stringData:\n  password: {{admin_password}}\n",
                    "---\n",
                    "kind: PersistentVolumeClaim\nmetadata:\n  name: {{app_name}}-data\n",
                    "spec:\n  resources:\n    requests:\n      storage: {{storage}}\n",
                    "---\n",
                    "kind: Deployment\nmetadata:\n  name: {{app_name}}\n",
                    "spec:\n  template:\n    spec:\n      containers:\n",
                    "      - image: {{image}}\n"
                )
                .to_string(),
            )]),
        };

        let redis = Blueprint {
            name: "redis".to_string(),
            category: "cache".to_string(),
            version: "7".to_string(),
            tags: vec![],
            requirements: Requirements {
                port: Some(6379),
                ..Default::default()
            },
            dependencies: vec![],
            defaults: BTreeMap::from([("image".to_string(), "redis:7".to_string())]),
            templates: BTreeMap::from([(
                Platform::Kubernetes,
                "kind: Deployment\nmetadata:\n  name: {{app_name}}\nspec:\n  image: {{image}}"
                    .to_string(),
            )]),
        };

        let authentik = Blueprint {
            name: "authentik".to_string(),
            category: "identity".to_string(),
            version: "2024.2".to_string(),
            tags: vec![],
            requirements: Requirements {
                port: Some(9000),
                database: Some("postgresql".to_string()),
                cache: Some("redis".to_string()),
                ..Default::default()
            },
            dependencies: vec!["postgresql".to_string(), "redis".to_string()],
            defaults: BTreeMap::from([(
                "image".to_string(),
                "ghcr.io/goauthentik/server:2024.2".to_string(),
            )]),
            templates: BTreeMap::from([(
                Platform::Kubernetes,
                concat!(
                    "kind: Deployment\nmetadata:\n  name: {{app_name}}\n",
                    "spec:\n  template:\n    spec:\n      containers:\n",
                    "      - image: {{image}}\n",
                    "        env:\n",
                    "        - name: AUTHENTIK_POSTGRESQL__HOST\n",
                    "          value: \"{{DATABASE_HOST}}\"\n",
                    "        - name: AUTHENTIK_REDIS__HOST\n",
                    "          value: \"{{CACHE_HOST}}\"\n",
                    "        - name: AUTHENTIK_SECRET_KEY\n",
                    "          value: \"{{secret_key}}\"\n"
                )
                .to_string(),
            )]),
        };

        BlueprintStore::from_blueprints(vec![postgresql, redis, authentik]).unwrap()
    }

    fn parsed(action: IntentAction, application: &str) -> ParsedIntent {
        ParsedIntent {
            action,
            application: application.to_string(),
            confidence: 0.9,
            parameters: BTreeMap::new(),
            dependencies_hint: vec![],
            suggested_platform: None,
        }
    }

    #[test]
    fn test_single_node_plan_with_storage_override() {
        let store = catalog();
        let mut intent = parsed(IntentAction::Install, "postgresql");
        intent
            .parameters
            .insert("storage".to_string(), "10Gi".to_string());

        let order = resolution_order(&store, &intent).unwrap();
        assert_eq!(order, vec!["postgresql"]);

        let mut secrets = SecretBag::new();
        let planned = plan_deployment(
            &store,
            Platform::Kubernetes,
            "default",
            &intent,
            &order,
            &mut secrets,
        )
        .unwrap();

        assert_eq!(planned.plan.len(), 1);
        let pvc = planned.plan[0]
            .manifests
            .iter()
            .find(|m| m.contains("PersistentVolumeClaim"))
            .unwrap();
        assert!(pvc.contains("storage: 10Gi"));
    }

    #[test]
    fn test_authentik_plan_wires_upstream_hosts() {
        let store = catalog();
        let intent = parsed(IntentAction::Install, "authentik");

        let order = resolution_order(&store, &intent).unwrap();
        assert_eq!(order, vec!["postgresql", "redis", "authentik"]);

        let mut secrets = SecretBag::new();
        let planned = plan_deployment(
            &store,
            Platform::Kubernetes,
            "default",
            &intent,
            &order,
            &mut secrets,
        )
        .unwrap();

        let authentik = &planned.plan[2];
        assert_eq!(authentik.blueprint_name, "authentik");
        let manifest = &authentik.manifests[0];
        assert!(manifest.contains("AUTHENTIK_POSTGRESQL__HOST"));
        assert!(manifest.contains("value: \"postgresql\""));
        assert!(manifest.contains("AUTHENTIK_REDIS__HOST"));
        assert!(manifest.contains("value: \"redis\""));

        // Both providers are hard dependencies of the root.
        let hard = hard_dependencies(&store, &order).unwrap();
        assert!(hard.contains("postgresql"));
        assert!(hard.contains("redis"));

        let vars = planned.resolved_variables.get("authentik").unwrap();
        assert_eq!(
            vars.get("DATABASE_HOST"),
            Some(&VarValue::literal("postgresql"))
        );
    }

    #[test]
    fn test_scale_plan_renders_nothing() {
        let store = catalog();
        let mut intent = parsed(IntentAction::Scale, "redis");
        intent
            .parameters
            .insert("replicas".to_string(), "3".to_string());

        let order = resolution_order(&store, &intent).unwrap();
        assert_eq!(order, vec!["redis"]);

        let mut secrets = SecretBag::new();
        let planned = plan_deployment(
            &store,
            Platform::Kubernetes,
            "default",
            &intent,
            &order,
            &mut secrets,
        )
        .unwrap();

        assert_eq!(planned.plan.len(), 1);
        assert!(planned.plan[0].manifests.is_empty());
        assert!(secrets.is_empty());
    }

    #[test]
    fn test_plan_is_deterministic_given_same_secrets() {
        let store = catalog();
        let intent = parsed(IntentAction::Install, "authentik");
        let order = resolution_order(&store, &intent).unwrap();

        let mut secrets = SecretBag::new();
        let first = plan_deployment(
            &store,
            Platform::Kubernetes,
            "default",
            &intent,
            &order,
            &mut secrets,
        )
        .unwrap();

        // Second pass reuses the same bag, as a retried intent would.
        let second = plan_deployment(
            &store,
            Platform::Kubernetes,
            "default",
            &intent,
            &order,
            &mut secrets,
        )
        .unwrap();

        for (a, b) in first.plan.iter().zip(second.plan.iter()) {
            assert_eq!(a.manifests, b.manifests);
        }
    }

    #[test]
    fn test_unsupported_platform_fails_before_rendering() {
        let store = catalog();
        let intent = parsed(IntentAction::Install, "redis");
        let order = resolution_order(&store, &intent).unwrap();

        let mut secrets = SecretBag::new();
        let err = plan_deployment(
            &store,
            Platform::Compose,
            "default",
            &intent,
            &order,
            &mut secrets,
        )
        .unwrap_err();

        assert!(matches!(err, EngineError::PlatformUnsupported { .. }));
    }
}
