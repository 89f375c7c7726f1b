//! Auto-wiring engine
//!
//! Derives the full variable set needed to render one plan node, layering
//! blueprint defaults, intent-level overrides, generated secrets, and the
//! addresses of already-resolved upstream dependencies. Runs strictly in
//! resolution order so a consumer always wires after its providers.

use std::collections::BTreeMap;

use deckhand_core::domain::blueprint::{Blueprint, Platform};
use deckhand_core::domain::variables::{ResolvedVariables, VarValue};

use crate::engine::error::{EngineError, Result};
use crate::engine::manifest;
use crate::engine::secrets::SecretBag;

/// What a wired node exposes to downstream consumers.
#[derive(Debug, Clone)]
pub struct WiredNode {
    pub name: String,
    pub category: String,
    pub service_name: String,
    pub port: Option<u16>,
    /// Administrative user exposed to consumers, from the blueprint's
    /// `database_user` default.
    pub database_user: Option<String>,
}

/// Resolve the variable set for one node.
///
/// `overrides` are the intent-level parameters (applied to the root
/// application only); `upstream` maps blueprint name to the already-wired
/// nodes earlier in the plan.
pub fn wire_node(
    blueprint: &Blueprint,
    platform: Platform,
    namespace: &str,
    overrides: &BTreeMap<String, String>,
    upstream: &BTreeMap<String, WiredNode>,
    secrets: &mut SecretBag,
) -> Result<(ResolvedVariables, WiredNode)> {
    let app_name = blueprint.name.as_str();
    let mut variables = ResolvedVariables::new();

    // (b) intent overrides take precedence over (a) blueprint defaults.
    for (name, value) in overrides {
        variables.set(name.clone(), VarValue::literal(value.clone()));
    }
    for (name, value) in &blueprint.defaults {
        variables.set_if_absent(name.clone(), VarValue::literal(value.clone()));
    }

    // Standard injected set. Service names default to the app name, which
    // fixes the addresses upstream consumers are wired against.
    variables.set("app_name", VarValue::literal(app_name));
    variables.set("namespace", VarValue::literal(namespace));
    variables.set_if_absent("service_name", VarValue::literal(app_name));
    variables.set_if_absent("replicas", VarValue::literal("1"));
    if let Some(port) = blueprint.requirements.port {
        variables.set_if_absent("port", VarValue::literal(port.to_string()));
    }
    if let Some(storage) = &blueprint.requirements.storage {
        variables.set_if_absent("storage", VarValue::literal(storage.clone()));
    }

    // (c) generated secrets, issued only when the node's template actually
    // uses them and reused across wiring passes for the same intent.
    let referenced = blueprint
        .template(platform)
        .map(manifest::placeholders)
        .unwrap_or_default();

    if referenced.contains("admin_password") {
        let key = format!("{}.admin_password", app_name);
        secrets.get_or_generate_password(&key);
        variables.set("admin_password", VarValue::secret(key));
    }
    if referenced.contains("secret_key") {
        let key = format!("{}.secret_key", app_name);
        secrets.get_or_generate_key(&key);
        variables.set("secret_key", VarValue::secret(key));
    }

    // (d) connection inference against already-wired providers.
    if let Some(kind) = &blueprint.requirements.database {
        let provider = find_provider(upstream, kind, "database").ok_or_else(|| {
            EngineError::UnresolvedRequirement {
                blueprint: app_name.to_string(),
                requirement: "database".to_string(),
            }
        })?;

        let user = provider
            .database_user
            .clone()
            .unwrap_or_else(|| provider.name.clone());
        let port = provider.port.unwrap_or(5432);
        let password_key = format!("{}.admin_password", provider.name);
        let password = secrets.get_or_generate_password(&password_key);

        variables.set("DATABASE_HOST", VarValue::literal(&provider.service_name));
        variables.set("DATABASE_PORT", VarValue::literal(port.to_string()));
        variables.set("DATABASE_NAME", VarValue::literal(app_name));
        variables.set("DATABASE_USER", VarValue::literal(&user));
        variables.set("DATABASE_PASSWORD", VarValue::secret(&password_key));

        let url_key = format!("{}.database_url", app_name);
        let url = format!(
            "{}://{}:{}@{}:{}/{}",
            url_scheme(kind),
            user,
            password,
            provider.service_name,
            port,
            app_name
        );
        secrets.get_or_insert_derived(&url_key, url);
        variables.set("DATABASE_URL", VarValue::secret(url_key));
    }

    if let Some(kind) = &blueprint.requirements.cache {
        let provider = find_provider(upstream, kind, "cache").ok_or_else(|| {
            EngineError::UnresolvedRequirement {
                blueprint: app_name.to_string(),
                requirement: "cache".to_string(),
            }
        })?;

        variables.set("CACHE_HOST", VarValue::literal(&provider.service_name));
        variables.set(
            "CACHE_PORT",
            VarValue::literal(provider.port.unwrap_or(6379).to_string()),
        );
    }

    // Networking: ingress/TLS variables populate only when the blueprint
    // wants ingress and a domain parameter arrived.
    if blueprint.requirements.ingress_enabled() && variables.contains("domain") {
        variables.set_if_absent(
            "tls_secret_name",
            VarValue::literal(format!("{}-tls", app_name)),
        );
        variables.set_if_absent("cert_issuer", VarValue::literal("letsencrypt"));
    }

    let node = WiredNode {
        name: app_name.to_string(),
        category: blueprint.category.clone(),
        service_name: app_name.to_string(),
        port: blueprint.requirements.port,
        database_user: blueprint.defaults.get("database_user").cloned(),
    };

    Ok((variables, node))
}

/// A provider satisfies a requirement if its blueprint name equals the
/// required kind, or failing that, if its category matches the requirement
/// class.
fn find_provider<'a>(
    upstream: &'a BTreeMap<String, WiredNode>,
    kind: &str,
    category: &str,
) -> Option<&'a WiredNode> {
    upstream
        .get(kind)
        .or_else(|| upstream.values().find(|node| node.category == category))
}

fn url_scheme(kind: &str) -> &str {
    match kind {
        "postgresql" | "postgres" => "postgresql",
        "mysql" | "mariadb" => "mysql",
        other => other,
    }
}
