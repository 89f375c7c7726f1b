//! Intent parser
//!
//! Maps a raw command string into a `ParsedIntent` draft. The action
//! vocabulary is closed; application extraction prefers the longest known
//! blueprint name present in the command and falls back to the first
//! noun-like token with a confidence penalty. Low-confidence parses are
//! passed through for the caller to judge; only an empty command or a
//! missing action token is an error.

use regex::Regex;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

use deckhand_core::domain::blueprint::Platform;
use deckhand_core::domain::intent::{IntentAction, ParsedIntent};

use crate::engine::error::{EngineError, Result};
use crate::engine::store::BlueprintStore;

static STORAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d+)\s*(gb|gi|tb|ti)\b").unwrap());
static REPLICAS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d+)\s+replicas?\b").unwrap());
static DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bon\s+([a-z0-9][a-z0-9-]*(?:\.[a-z0-9][a-z0-9-]*)+)\b").unwrap()
});

/// Words that can never be an application name.
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "with", "on", "to", "for", "and", "using", "in", "of", "storage",
    "replica", "replicas", "tls", "letsencrypt", "kubernetes", "k8s", "compose", "docker",
];

pub fn parse_command(command: &str, store: &BlueprintStore) -> Result<ParsedIntent> {
    let command = command.trim();
    if command.is_empty() {
        return Err(EngineError::IntentParse("empty command".to_string()));
    }

    let lowered = command.to_lowercase();
    let tokens: Vec<&str> = lowered
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '.' && c != '-')
        .filter(|t| !t.is_empty())
        .collect();

    let action = extract_action(&tokens).ok_or_else(|| {
        EngineError::IntentParse(format!("no recognizable action in \"{}\"", command))
    })?;

    let parameters = extract_parameters(&lowered, &tokens);
    let suggested_platform = extract_platform(&tokens);

    let (application, mut confidence) = extract_application(&tokens, store, &parameters);

    let dependencies_hint = match store.dependencies_of(&application) {
        Ok(deps) => deps,
        Err(_) => {
            // Unknown application: the parse still goes through, the
            // blueprint lookup downstream decides its fate.
            confidence = (confidence - 0.1).max(0.1);
            vec![]
        }
    };

    tracing::debug!(
        "Parsed \"{}\" as {:?} {} (confidence {:.2})",
        command,
        action,
        application,
        confidence
    );

    Ok(ParsedIntent {
        action,
        application,
        confidence,
        parameters,
        dependencies_hint,
        suggested_platform,
    })
}

fn extract_action(tokens: &[&str]) -> Option<IntentAction> {
    tokens.iter().find_map(|token| match *token {
        "install" | "deploy" => Some(IntentAction::Install),
        "scale" => Some(IntentAction::Scale),
        "update" | "upgrade" => Some(IntentAction::Update),
        "remove" | "delete" | "uninstall" => Some(IntentAction::Remove),
        _ => None,
    })
}

/// Longest known blueprint name present as a token wins; otherwise the
/// first noun-like token, with a confidence penalty.
fn extract_application(
    tokens: &[&str],
    store: &BlueprintStore,
    parameters: &BTreeMap<String, String>,
) -> (String, f64) {
    let mut known = store.names();
    known.sort_by_key(|name| std::cmp::Reverse(name.len()));

    for name in &known {
        if tokens.iter().any(|t| t.eq_ignore_ascii_case(name)) {
            return (name.clone(), 0.9);
        }
    }

    let domain = parameters.get("domain").map(String::as_str);
    let fallback = tokens.iter().copied().find(|token| {
        !STOPWORDS.contains(token)
            && extract_action(&[*token]).is_none()
            && !token.chars().next().is_some_and(|c| c.is_ascii_digit())
            && domain != Some(*token)
    });

    match fallback {
        Some(token) => (token.to_string(), 0.5),
        None => (String::new(), 0.1),
    }
}

fn extract_parameters(command: &str, tokens: &[&str]) -> BTreeMap<String, String> {
    let mut parameters = BTreeMap::new();

    if let Some(caps) = STORAGE.captures(command) {
        let amount = &caps[1];
        let unit = match caps[2].to_lowercase().as_str() {
            "gb" | "gi" => "Gi",
            _ => "Ti",
        };
        parameters.insert("storage".to_string(), format!("{}{}", amount, unit));
    }

    if let Some(caps) = REPLICAS.captures(command) {
        parameters.insert("replicas".to_string(), caps[1].to_string());
    }

    if let Some(caps) = DOMAIN.captures(command) {
        parameters.insert("domain".to_string(), caps[1].to_string());
    }

    if has_phrase(tokens, "with", "tls") {
        parameters.insert("tls".to_string(), "true".to_string());
    }
    if has_phrase(tokens, "with", "letsencrypt") {
        parameters.insert("tls".to_string(), "true".to_string());
        parameters.insert("cert_issuer".to_string(), "letsencrypt".to_string());
    }

    parameters
}

fn has_phrase(tokens: &[&str], first: &str, second: &str) -> bool {
    tokens
        .windows(2)
        .any(|pair| pair[0] == first && pair[1] == second)
}

fn extract_platform(tokens: &[&str]) -> Option<Platform> {
    tokens
        .iter()
        .find_map(|token| Platform::from_str(token).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckhand_core::domain::blueprint::{Blueprint, Requirements};
    use std::collections::BTreeMap as Map;

    fn test_store() -> BlueprintStore {
        let blueprints = ["postgresql", "redis", "authentik", "nginx"]
            .into_iter()
            .map(|name| {
                let mut templates = Map::new();
                templates.insert(Platform::Kubernetes, "name: {{app_name}}".to_string());
                Blueprint {
                    name: name.to_string(),
                    category: "app".to_string(),
                    version: "1".to_string(),
                    tags: vec![],
                    requirements: Requirements::default(),
                    dependencies: if name == "authentik" {
                        vec!["postgresql".to_string(), "redis".to_string()]
                    } else {
                        vec![]
                    },
                    defaults: Map::new(),
                    templates,
                }
            })
            .collect();

        BlueprintStore::from_blueprints(blueprints).unwrap()
    }

    #[test]
    fn test_install_with_storage() {
        let parsed = parse_command("install postgresql with 10GB storage", &test_store()).unwrap();

        assert_eq!(parsed.action, IntentAction::Install);
        assert_eq!(parsed.application, "postgresql");
        assert_eq!(parsed.parameters.get("storage").unwrap(), "10Gi");
        assert!(parsed.confidence >= 0.9);
    }

    #[test]
    fn test_install_on_domain() {
        let parsed =
            parse_command("install authentik on auth.example.com", &test_store()).unwrap();

        assert_eq!(parsed.application, "authentik");
        assert_eq!(parsed.parameters.get("domain").unwrap(), "auth.example.com");
        assert_eq!(
            parsed.dependencies_hint,
            vec!["postgresql".to_string(), "redis".to_string()]
        );
    }

    #[test]
    fn test_scale_with_replicas() {
        let parsed = parse_command("scale nginx to 3 replicas", &test_store()).unwrap();

        assert_eq!(parsed.action, IntentAction::Scale);
        assert_eq!(parsed.application, "nginx");
        assert_eq!(parsed.parameters.get("replicas").unwrap(), "3");
    }

    #[test]
    fn test_terabyte_storage_normalized() {
        let parsed = parse_command("install postgresql with 2TB storage", &test_store()).unwrap();
        assert_eq!(parsed.parameters.get("storage").unwrap(), "2Ti");
    }

    #[test]
    fn test_tls_and_issuer_flags() {
        let parsed = parse_command(
            "deploy authentik on auth.example.com with letsencrypt",
            &test_store(),
        )
        .unwrap();

        assert_eq!(parsed.parameters.get("tls").unwrap(), "true");
        assert_eq!(parsed.parameters.get("cert_issuer").unwrap(), "letsencrypt");
    }

    #[test]
    fn test_platform_hint() {
        let parsed = parse_command("install nginx on k8s", &test_store()).unwrap();
        assert_eq!(parsed.suggested_platform, Some(Platform::Kubernetes));

        let parsed = parse_command("install nginx using docker", &test_store()).unwrap();
        assert_eq!(parsed.suggested_platform, Some(Platform::Compose));
    }

    #[test]
    fn test_empty_command_fails() {
        assert!(matches!(
            parse_command("", &test_store()),
            Err(EngineError::IntentParse(_))
        ));
        assert!(matches!(
            parse_command("   ", &test_store()),
            Err(EngineError::IntentParse(_))
        ));
    }

    #[test]
    fn test_unrecognized_action_fails() {
        assert!(matches!(
            parse_command("frobnicate nginx", &test_store()),
            Err(EngineError::IntentParse(_))
        ));
    }

    #[test]
    fn test_unknown_application_passes_with_penalty() {
        let parsed = parse_command("install gitea", &test_store()).unwrap();

        assert_eq!(parsed.application, "gitea");
        assert!(parsed.confidence < 0.9);
        assert!(parsed.dependencies_hint.is_empty());
    }
}
