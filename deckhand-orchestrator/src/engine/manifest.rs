//! Manifest generator
//!
//! Renders platform-specific resource documents from a blueprint template
//! and a fully resolved variable map. Substitution is strict: a placeholder
//! left unresolved fails the render rather than emitting an empty value
//! into a field that affects addressing or security.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use deckhand_core::domain::blueprint::Platform;
use deckhand_core::domain::resource::ResourceReference;
use deckhand_core::domain::variables::{ResolvedVariables, VarValue};

use crate::engine::error::{EngineError, Result};
use crate::engine::secrets::SecretBag;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap());

/// All placeholder variable names referenced by a template.
pub fn placeholders(template: &str) -> BTreeSet<String> {
    PLACEHOLDER
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Render a blueprint template into one or more resource documents.
///
/// Secret-backed variables are resolved through the bag at render time;
/// their values end up in the manifests (a Secret resource needs them) but
/// never in the intent record or logs.
pub fn render(
    blueprint_name: &str,
    template: &str,
    platform: Platform,
    variables: &ResolvedVariables,
    secrets: &SecretBag,
) -> Result<Vec<String>> {
    let mut rendered = String::with_capacity(template.len());
    let mut last_end = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let whole = caps.get(0).unwrap();
        let name = &caps[1];

        let value = match variables.get(name) {
            Some(VarValue::Literal { value }) => value.clone(),
            Some(VarValue::Secret { key }) => secrets
                .get(key)
                .ok_or_else(|| EngineError::ManifestRender {
                    blueprint: blueprint_name.to_string(),
                    reason: format!("secret {} was never issued", key),
                })?
                .to_string(),
            None => {
                return Err(EngineError::ManifestRender {
                    blueprint: blueprint_name.to_string(),
                    reason: format!("unresolved placeholder {}", name),
                });
            }
        };

        // Storage quantities are normalized to Kubernetes style; Compose
        // volume options take the unsuffixed form (10Gi -> 10G).
        let value = if platform == Platform::Compose && name == "storage" {
            compose_quantity(&value)
        } else {
            value
        };

        rendered.push_str(&template[last_end..whole.start()]);
        rendered.push_str(&value);
        last_end = whole.end();
    }
    rendered.push_str(&template[last_end..]);

    let documents: Vec<String> = split_documents(&rendered);
    if documents.is_empty() {
        return Err(EngineError::ManifestRender {
            blueprint: blueprint_name.to_string(),
            reason: "template rendered no documents".to_string(),
        });
    }

    Ok(documents)
}

/// Convert a Kubernetes-style quantity into Compose volume syntax.
pub fn compose_quantity(quantity: &str) -> String {
    quantity
        .strip_suffix("Gi")
        .map(|n| format!("{}G", n))
        .or_else(|| quantity.strip_suffix("Ti").map(|n| format!("{}T", n)))
        .unwrap_or_else(|| quantity.to_string())
}

/// Split a rendered template into YAML documents on `---` separators,
/// dropping empty ones.
fn split_documents(rendered: &str) -> Vec<String> {
    rendered
        .split("\n---")
        .map(|doc| doc.trim_start_matches("---").trim())
        .filter(|doc| !doc.is_empty())
        .map(|doc| doc.to_string())
        .collect()
}

/// Derive the resource references a set of rendered manifests will create.
///
/// Naming is deterministic (`{app_name}`, `{app_name}-{suffix}`), so the
/// same manifests always yield the same references; re-applying is a
/// reference-level no-op.
pub fn extract_references(
    manifests: &[String],
    platform: Platform,
    namespace: &str,
) -> Result<Vec<ResourceReference>> {
    let mut refs = Vec::new();

    for manifest in manifests {
        let value: serde_yaml::Value = serde_yaml::from_str(manifest)
            .map_err(|e| EngineError::PlatformApply(format!("unparseable manifest: {}", e)))?;

        match platform {
            Platform::Kubernetes => {
                let kind = value
                    .get("kind")
                    .and_then(|k| k.as_str())
                    .ok_or_else(|| {
                        EngineError::PlatformApply("manifest missing kind".to_string())
                    })?;
                let name = value
                    .get("metadata")
                    .and_then(|m| m.get("name"))
                    .and_then(|n| n.as_str())
                    .ok_or_else(|| {
                        EngineError::PlatformApply("manifest missing metadata.name".to_string())
                    })?;

                refs.push(ResourceReference::new(kind, name, namespace, platform));
            }
            Platform::Compose => {
                let services = value
                    .get("services")
                    .and_then(|s| s.as_mapping())
                    .ok_or_else(|| {
                        EngineError::PlatformApply(
                            "compose fragment missing services".to_string(),
                        )
                    })?;

                for key in services.keys() {
                    if let Some(name) = key.as_str() {
                        refs.push(ResourceReference::new(
                            "compose-service",
                            name,
                            namespace,
                            platform,
                        ));
                    }
                }
            }
        }
    }

    Ok(refs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> ResolvedVariables {
        let mut vars = ResolvedVariables::new();
        for (name, value) in pairs {
            vars.set(*name, VarValue::literal(*value));
        }
        vars
    }

    #[test]
    fn test_placeholders_deduplicated() {
        let found = placeholders("{{app_name}} uses {{image}} as {{ app_name }}");
        assert_eq!(
            found.into_iter().collect::<Vec<_>>(),
            vec!["app_name".to_string(), "image".to_string()]
        );
    }

    #[test]
    fn test_render_substitutes_all_placeholders() {
        let template = "name: {{app_name}}\nimage: {{image}}";
        let docs = render(
            "nginx",
            template,
            Platform::Kubernetes,
            &vars(&[("app_name", "nginx"), ("image", "nginx:1.27")]),
            &SecretBag::new(),
        )
        .unwrap();

        assert_eq!(docs, vec!["name: nginx\nimage: nginx:1.27".to_string()]);
    }

    #[test]
    fn test_render_fails_on_unresolved_placeholder() {
        let err = render(
            "nginx",
            "storage: {{storage}}",
            Platform::Kubernetes,
            &vars(&[]),
            &SecretBag::new(),
        )
        .unwrap_err();

        match err {
            EngineError::ManifestRender { blueprint, reason } => {
                assert_eq!(blueprint, "nginx");
                assert!(reason.contains("storage"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_render_resolves_secrets_from_bag() {
        let mut bag = SecretBag::new();
        let password = bag.get_or_generate_password("postgresql.admin_password");

        let mut variables = ResolvedVariables::new();
        variables.set("admin_password", VarValue::secret("postgresql.admin_password"));

        let docs = render(
            "postgresql",
            "password: {{admin_password}}",
            Platform::Kubernetes,
            &variables,
            &bag,
        )
        .unwrap();

        assert_eq!(docs[0], format!("password: {}", password));
    }

    #[test]
    fn test_render_splits_multi_document_templates() {
        let template = "kind: Service\nmetadata:\n  name: {{app_name}}\n---\nkind: Deployment\nmetadata:\n  name: {{app_name}}";
        let docs = render(
            "nginx",
            template,
            Platform::Kubernetes,
            &vars(&[("app_name", "nginx")]),
            &SecretBag::new(),
        )
        .unwrap();

        assert_eq!(docs.len(), 2);
        assert!(docs[0].starts_with("kind: Service"));
        assert!(docs[1].starts_with("kind: Deployment"));
    }

    #[test]
    fn test_compose_storage_quantity_conversion() {
        assert_eq!(compose_quantity("10Gi"), "10G");
        assert_eq!(compose_quantity("2Ti"), "2T");
        assert_eq!(compose_quantity("512M"), "512M");

        let docs = render(
            "postgresql",
            "size: {{storage}}",
            Platform::Compose,
            &vars(&[("storage", "10Gi")]),
            &SecretBag::new(),
        )
        .unwrap();
        assert_eq!(docs[0], "size: 10G");
    }

    #[test]
    fn test_extract_kubernetes_references() {
        let manifests = vec![
            "kind: Deployment\nmetadata:\n  name: nginx".to_string(),
            "kind: Service\nmetadata:\n  name: nginx".to_string(),
        ];

        let refs = extract_references(&manifests, Platform::Kubernetes, "web").unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].kind, "Deployment");
        assert_eq!(refs[1].kind, "Service");
        assert!(refs.iter().all(|r| r.name == "nginx" && r.namespace == "web"));
    }

    #[test]
    fn test_extract_compose_references() {
        let manifests =
            vec!["services:\n  redis:\n    image: redis:7\n".to_string()];

        let refs = extract_references(&manifests, Platform::Compose, "default").unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, "compose-service");
        assert_eq!(refs[0].name, "redis");
    }

    #[test]
    fn test_identical_manifests_yield_identical_references() {
        let manifests = vec!["kind: Deployment\nmetadata:\n  name: nginx".to_string()];

        let first = extract_references(&manifests, Platform::Kubernetes, "default").unwrap();
        let second = extract_references(&manifests, Platform::Kubernetes, "default").unwrap();
        assert_eq!(first, second);
    }
}
