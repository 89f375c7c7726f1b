//! Intent Service
//!
//! Business logic for deployment submission, status, retry, and cancel.
//! Submission parses the command up front so an unparseable request is
//! rejected without persisting anything, and enforces at most one active
//! install/update intent per application name.

use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use deckhand_core::domain::blueprint::Platform;
use deckhand_core::domain::intent::{
    DeploymentIntent, IntentAction, IntentStatus, ParsedIntent, StepOutcome,
};
use deckhand_core::dto::deploy::{
    DeployOptions, DeploySubmitted, DryRunEntry, DryRunReport, SubmitDeployment,
};

use crate::engine::error::EngineError;
use crate::engine::parser;
use crate::engine::pipeline;
use crate::engine::platform::ExecutorSet;
use crate::engine::secrets::SecretBag;
use crate::engine::store::BlueprintStore;
use crate::engine::worker::IntentWorker;
use crate::repository::intent as intent_repository;

/// Service error type
#[derive(Debug)]
pub enum IntentError {
    NotFound(Uuid),
    InvalidState(String),
    /// Another intent for the same application is still active.
    Conflict(String),
    Engine(EngineError),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for IntentError {
    fn from(err: sqlx::Error) -> Self {
        IntentError::DatabaseError(err)
    }
}

impl From<EngineError> for IntentError {
    fn from(err: EngineError) -> Self {
        IntentError::Engine(err)
    }
}

/// Submit a deployment command: parse, persist, and hand the intent to a
/// dedicated worker task.
pub async fn submit(
    pool: &PgPool,
    store: &Arc<BlueprintStore>,
    executors: &ExecutorSet,
    request: SubmitDeployment,
) -> Result<DeploySubmitted, IntentError> {
    let options = request.options.unwrap_or_default();
    let parsed = parse_with_options(&request.command, &options, store)?;

    let platform = select_platform(&parsed, &options, store);
    let namespace = options.namespace.unwrap_or_else(|| "default".to_string());

    // At most one active deployment per application name, so manifest
    // generation never races itself.
    if matches!(parsed.action, IntentAction::Install | IntentAction::Update) {
        let active =
            intent_repository::count_active_by_application(pool, &parsed.application).await?;
        if active > 0 {
            return Err(IntentError::Conflict(format!(
                "an intent for {} is already in progress",
                parsed.application
            )));
        }
    }

    let mut intent = DeploymentIntent::new(
        &request.command,
        &parsed.application,
        platform,
        namespace,
    );
    let confidence = parsed.confidence;
    intent.parsed = Some(parsed);

    if let Err(e) = intent_repository::create(pool, &intent).await {
        // The partial unique index backstops the check above against
        // concurrent submissions.
        if is_unique_violation(&e) {
            return Err(IntentError::Conflict(format!(
                "an intent for {} is already in progress",
                intent.application
            )));
        }
        return Err(e.into());
    }

    tracing::info!(
        "Intent created: {} for {} on {}",
        intent.id,
        intent.application,
        intent.platform
    );

    IntentWorker::new(pool.clone(), Arc::clone(store), executors.clone()).spawn(intent.id);

    Ok(DeploySubmitted {
        intent_id: intent.id,
        application: intent.application,
        confidence,
    })
}

/// Run parsing, resolution, and generation without persisting or touching
/// the platform; returns the manifests that would be applied.
pub fn dry_run(
    store: &Arc<BlueprintStore>,
    request: SubmitDeployment,
) -> Result<DryRunReport, IntentError> {
    let options = request.options.unwrap_or_default();
    let parsed = parse_with_options(&request.command, &options, store)?;

    let platform = select_platform(&parsed, &options, store);
    let namespace = options.namespace.unwrap_or_else(|| "default".to_string());

    let order = pipeline::resolution_order(store, &parsed)?;
    let mut secrets = SecretBag::new();
    let planned =
        pipeline::plan_deployment(store, platform, &namespace, &parsed, &order, &mut secrets)?;

    Ok(DryRunReport {
        parsed,
        platform,
        namespace,
        plan: planned
            .plan
            .into_iter()
            .map(|entry| DryRunEntry {
                blueprint_name: entry.blueprint_name,
                manifests: entry.manifests,
            })
            .collect(),
    })
}

/// Get an intent by ID
pub async fn get_intent(pool: &PgPool, id: Uuid) -> Result<DeploymentIntent, IntentError> {
    let intent = intent_repository::find_by_id(pool, id)
        .await?
        .ok_or(IntentError::NotFound(id))?;

    Ok(intent)
}

/// List intents, optionally filtered by status
pub async fn list_intents(
    pool: &PgPool,
    status: Option<IntentStatus>,
) -> Result<Vec<DeploymentIntent>, IntentError> {
    let intents = match status {
        Some(status) => intent_repository::find_by_status(pool, status).await?,
        None => intent_repository::list_all(pool).await?,
    };

    Ok(intents)
}

/// Re-drive a failed intent. The worker resumes at the first incomplete
/// step; applied plan entries keep their resource references.
pub async fn retry_intent(
    pool: &PgPool,
    store: &Arc<BlueprintStore>,
    executors: &ExecutorSet,
    id: Uuid,
) -> Result<DeploymentIntent, IntentError> {
    let mut intent = intent_repository::find_by_id(pool, id)
        .await?
        .ok_or(IntentError::NotFound(id))?;

    if intent.status != IntentStatus::Failed {
        return Err(IntentError::InvalidState(format!(
            "intent {} is {}, only failed intents can be retried",
            id,
            intent.status.as_str()
        )));
    }

    let active =
        intent_repository::count_active_by_application(pool, &intent.application).await?;
    if active > 0 {
        return Err(IntentError::Conflict(format!(
            "an intent for {} is already in progress",
            intent.application
        )));
    }

    intent.status = IntentStatus::Pending;
    intent.log_step("retry", StepOutcome::Succeeded, None);
    intent_repository::set_cancel_requested(pool, id, false).await?;
    intent_repository::update(pool, &intent).await?;

    tracing::info!("Intent {} queued for retry", id);

    IntentWorker::new(pool.clone(), Arc::clone(store), executors.clone()).spawn(id);

    Ok(intent)
}

/// Cancel an intent. Pre-deploy states cancel immediately; a deploying
/// intent finishes its in-flight step first, and already-applied resources
/// are left in place.
pub async fn cancel_intent(pool: &PgPool, id: Uuid) -> Result<DeploymentIntent, IntentError> {
    let mut intent = intent_repository::find_by_id(pool, id)
        .await?
        .ok_or(IntentError::NotFound(id))?;

    if intent.status.is_terminal() {
        return Err(IntentError::InvalidState(format!(
            "intent {} is already {}",
            id,
            intent.status.as_str()
        )));
    }

    intent_repository::set_cancel_requested(pool, id, true).await?;

    if intent.status.can_cancel() {
        intent.status = IntentStatus::Cancelled;
        intent.log_step("cancelled", StepOutcome::Skipped, None);
        intent_repository::update(pool, &intent).await?;
        tracing::info!("Intent {} cancelled", id);
    } else {
        tracing::info!("Intent {} will cancel after its current step", id);
    }

    Ok(intent)
}

// =============================================================================
// Helpers
// =============================================================================

/// Parse the command and fold the structured option overrides into the
/// parsed parameter bag, options winning over parsed values.
fn parse_with_options(
    command: &str,
    options: &DeployOptions,
    store: &BlueprintStore,
) -> Result<ParsedIntent, IntentError> {
    let mut parsed = parser::parse_command(command, store)?;

    let mut overrides: BTreeMap<String, String> = options.variables.clone();
    if let Some(domain) = &options.domain {
        overrides.insert("domain".to_string(), domain.clone());
    }
    if let Some(image) = &options.image {
        overrides.insert("image".to_string(), image.clone());
    }
    parsed.parameters.extend(overrides);

    Ok(parsed)
}

/// Explicit option beats the parsed hint beats what the blueprint
/// supports; Kubernetes is preferred when a blueprint supports both.
fn select_platform(
    parsed: &ParsedIntent,
    options: &DeployOptions,
    store: &BlueprintStore,
) -> Platform {
    if let Some(platform) = options.platform {
        return platform;
    }
    if let Some(platform) = parsed.suggested_platform {
        return platform;
    }

    match store.load(&parsed.application) {
        Ok(blueprint) if !blueprint.supports(Platform::Kubernetes) => Platform::Compose,
        _ => Platform::Kubernetes,
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}
