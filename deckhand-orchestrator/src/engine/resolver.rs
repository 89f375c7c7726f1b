//! Dependency resolver
//!
//! Expands a blueprint's dependency list into a deterministic, cycle-free
//! deployment order: depth-first from the root, every blueprint after all
//! of its dependencies, shared dependencies exactly once, root last. Pure
//! in-memory computation so the same graph always resolves to the same
//! order, which keeps retries reproducible.

use std::collections::BTreeSet;

use crate::engine::error::{EngineError, Result};
use crate::engine::store::BlueprintStore;

/// Resolve the deployment order rooted at `root`.
pub fn resolve(store: &BlueprintStore, root: &str) -> Result<Vec<String>> {
    let mut order = Vec::new();
    let mut visited = BTreeSet::new();
    let mut visiting = Vec::new();

    visit(store, root, &mut visiting, &mut visited, &mut order)?;

    tracing::debug!("Resolved {} into order {:?}", root, order);
    Ok(order)
}

fn visit(
    store: &BlueprintStore,
    name: &str,
    visiting: &mut Vec<String>,
    visited: &mut BTreeSet<String>,
    order: &mut Vec<String>,
) -> Result<()> {
    if visited.contains(name) {
        return Ok(());
    }

    if let Some(start) = visiting.iter().position(|n| n == name) {
        let mut cycle_path: Vec<String> = visiting[start..].to_vec();
        cycle_path.push(name.to_string());
        return Err(EngineError::DependencyCycle { cycle_path });
    }

    let blueprint = store.load(name)?;

    visiting.push(name.to_string());
    for dependency in &blueprint.dependencies {
        visit(store, dependency, visiting, visited, order)?;
    }
    visiting.pop();

    visited.insert(name.to_string());
    order.push(name.to_string());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckhand_core::domain::blueprint::{Blueprint, Platform, Requirements};
    use std::collections::BTreeMap;

    fn blueprint(name: &str, dependencies: &[&str]) -> Blueprint {
        let mut templates = BTreeMap::new();
        templates.insert(Platform::Kubernetes, "name: {{app_name}}".to_string());

        Blueprint {
            name: name.to_string(),
            category: "app".to_string(),
            version: "1".to_string(),
            tags: vec![],
            requirements: Requirements::default(),
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            defaults: BTreeMap::new(),
            templates,
        }
    }

    fn store(blueprints: Vec<Blueprint>) -> BlueprintStore {
        BlueprintStore::from_blueprints(blueprints).unwrap()
    }

    #[test]
    fn test_root_last_dependencies_first() {
        let store = store(vec![
            blueprint("authentik", &["postgresql", "redis"]),
            blueprint("postgresql", &[]),
            blueprint("redis", &[]),
        ]);

        let order = resolve(&store, "authentik").unwrap();
        assert_eq!(order, vec!["postgresql", "redis", "authentik"]);
    }

    #[test]
    fn test_shared_dependency_appears_once_before_first_consumer() {
        // Both middle nodes depend on redis; it must appear exactly once,
        // ahead of both.
        let store = store(vec![
            blueprint("app", &["queue", "cache-user"]),
            blueprint("queue", &["redis"]),
            blueprint("cache-user", &["redis"]),
            blueprint("redis", &[]),
        ]);

        let order = resolve(&store, "app").unwrap();
        assert_eq!(order, vec!["redis", "queue", "cache-user", "app"]);
    }

    #[test]
    fn test_duplicate_dependency_entries_deduplicated() {
        let store = store(vec![
            blueprint("app", &["redis", "redis"]),
            blueprint("redis", &[]),
        ]);

        let order = resolve(&store, "app").unwrap();
        assert_eq!(order, vec!["redis", "app"]);
    }

    #[test]
    fn test_deterministic_order() {
        let store = store(vec![
            blueprint("app", &["b", "a", "c"]),
            blueprint("a", &[]),
            blueprint("b", &["a"]),
            blueprint("c", &["b"]),
        ]);

        let first = resolve(&store, "app").unwrap();
        for _ in 0..10 {
            assert_eq!(resolve(&store, "app").unwrap(), first);
        }
        assert_eq!(first, vec!["a", "b", "c", "app"]);
    }

    #[test]
    fn test_cycle_detected_with_path() {
        let store = store(vec![blueprint("a", &["b"]), blueprint("b", &["a"])]);

        match resolve(&store, "a") {
            Err(EngineError::DependencyCycle { cycle_path }) => {
                assert_eq!(cycle_path, vec!["a", "b", "a"]);
            }
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_self_cycle_detected() {
        let store = store(vec![blueprint("a", &["a"])]);
        assert!(matches!(
            resolve(&store, "a"),
            Err(EngineError::DependencyCycle { .. })
        ));
    }

    #[test]
    fn test_missing_dependency_is_not_found() {
        let store = store(vec![blueprint("app", &["ghost"])]);
        assert!(matches!(
            resolve(&store, "app"),
            Err(EngineError::BlueprintNotFound(name)) if name == "ghost"
        ));
    }
}
