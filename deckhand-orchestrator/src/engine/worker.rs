//! Intent worker
//!
//! Drives one deployment intent through the pipeline state machine,
//! persisting the record after every transition so a crash or restart
//! resumes instead of restarting. Stages whose output already exists are
//! skipped, which is what makes retry re-enter at the first incomplete
//! step. Cancellation is cooperative: the flag is checked between steps
//! and in-flight platform calls are allowed to finish.

use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use deckhand_core::domain::blueprint::Platform;
use deckhand_core::domain::intent::{
    DeploymentIntent, IntentAction, IntentStatus, ParsedIntent, PlanEntry, StepOutcome,
};
use deckhand_core::domain::resource::ResourceReference;

use crate::engine::error::EngineError;
use crate::engine::parser;
use crate::engine::pipeline;
use crate::engine::platform::{ExecutorSet, PlatformExecutor};
use crate::engine::secrets::SecretBag;
use crate::engine::store::BlueprintStore;
use crate::engine::manifest;
use crate::repository::{intent as intent_repository, secret as secret_repository};

/// Bounded automatic retries for transient platform errors. Configuration
/// errors never consume an attempt.
pub const MAX_TRANSIENT_RETRIES: u32 = 3;

/// Per-entry readiness wait bound.
pub const READY_TIMEOUT: Duration = Duration::from_secs(180);

/// Outcome of one pass over the deploy stage.
enum DeployOutcome {
    Completed,
    Cancelled,
    Transient(EngineError),
    Config(EngineError),
}

/// Outcome of applying a single plan entry.
pub struct EntryResult {
    pub refs: Vec<ResourceReference>,
    /// Readiness degradation that did not fail the entry.
    pub warning: Option<String>,
}

pub struct IntentWorker {
    pool: PgPool,
    store: Arc<BlueprintStore>,
    executors: ExecutorSet,
}

impl IntentWorker {
    pub fn new(pool: PgPool, store: Arc<BlueprintStore>, executors: ExecutorSet) -> Self {
        Self {
            pool,
            store,
            executors,
        }
    }

    /// Drive the intent on its own task. One worker per intent; workers
    /// share nothing but the database and the platform APIs.
    pub fn spawn(self, intent_id: Uuid) {
        tokio::spawn(async move {
            if let Err(e) = self.run(intent_id).await {
                error!("Worker for intent {} aborted on database error: {}", intent_id, e);
            }
        });
    }

    pub async fn run(&self, intent_id: Uuid) -> Result<(), sqlx::Error> {
        let Some(mut intent) = intent_repository::find_by_id(&self.pool, intent_id).await? else {
            warn!("Intent {} no longer exists", intent_id);
            return Ok(());
        };
        if intent.status.is_terminal() {
            debug!("Intent {} is already {:?}", intent_id, intent.status);
            return Ok(());
        }

        info!("Driving intent {} (\"{}\")", intent.id, intent.raw_command);

        // Parsing
        if self.finish_if_cancelled(&mut intent).await? {
            return Ok(());
        }
        intent.status = IntentStatus::Parsing;
        if intent.parsed.is_none() {
            match parser::parse_command(&intent.raw_command, &self.store) {
                Ok(parsed) => {
                    intent.application = parsed.application.clone();
                    intent.log_step(
                        "parsing",
                        StepOutcome::Succeeded,
                        Some(format!(
                            "{:?} {} (confidence {:.2})",
                            parsed.action, parsed.application, parsed.confidence
                        )),
                    );
                    intent.parsed = Some(parsed);
                }
                Err(e) => return self.fail(intent, "parsing", e).await,
            }
        } else {
            intent.log_step(
                "parsing",
                StepOutcome::Skipped,
                Some("command already parsed".to_string()),
            );
        }
        intent_repository::update(&self.pool, &intent).await?;

        let Some(parsed) = intent.parsed.clone() else {
            let err = EngineError::IntentParse("intent lost its parsed command".to_string());
            return self.fail(intent, "resolving", err).await;
        };

        // Resolving
        if self.finish_if_cancelled(&mut intent).await? {
            return Ok(());
        }
        intent.status = IntentStatus::Resolving;
        let order = if intent.plan.is_empty() {
            match pipeline::resolution_order(&self.store, &parsed) {
                Ok(order) => {
                    intent.log_step(
                        "resolving",
                        StepOutcome::Succeeded,
                        Some(order.join(" -> ")),
                    );
                    order
                }
                Err(e) => return self.fail(intent, "resolving", e).await,
            }
        } else {
            intent.log_step(
                "resolving",
                StepOutcome::Skipped,
                Some("plan already resolved".to_string()),
            );
            intent.plan.iter().map(|e| e.blueprint_name.clone()).collect()
        };
        intent_repository::update(&self.pool, &intent).await?;

        // Generating
        if self.finish_if_cancelled(&mut intent).await? {
            return Ok(());
        }
        intent.status = IntentStatus::Generating;
        if intent.plan.is_empty() {
            let stored = secret_repository::load_for_intent(&self.pool, intent.id).await?;
            let mut secrets = SecretBag::from_map(stored);

            match pipeline::plan_deployment(
                &self.store,
                intent.platform,
                &intent.namespace,
                &parsed,
                &order,
                &mut secrets,
            ) {
                Ok(planned) => {
                    secret_repository::store_for_intent(&self.pool, intent.id, secrets.values())
                        .await?;
                    intent.resolved_variables = planned.resolved_variables;
                    let manifest_count: usize =
                        planned.plan.iter().map(|e| e.manifests.len()).sum();
                    intent.plan = planned.plan;
                    intent.log_step(
                        "generating",
                        StepOutcome::Succeeded,
                        Some(format!(
                            "{} plan entr(ies), {} manifest(s)",
                            intent.plan.len(),
                            manifest_count
                        )),
                    );
                }
                Err(e) => return self.fail(intent, "generating", e).await,
            }
        } else {
            intent.log_step(
                "generating",
                StepOutcome::Skipped,
                Some("manifests already generated".to_string()),
            );
        }
        intent_repository::update(&self.pool, &intent).await?;

        // Deploying, with bounded retry on transient platform errors.
        // `retry_count` accumulates over the intent's lifetime for audit;
        // the bound applies per run, so a manual retry starts fresh.
        intent.status = IntentStatus::Deploying;
        intent_repository::update(&self.pool, &intent).await?;
        let executor = self.executors.for_platform(intent.platform);
        let mut attempts = 0;

        loop {
            match self.deploy(&mut intent, &parsed, executor.as_ref()).await? {
                DeployOutcome::Completed => break,
                DeployOutcome::Cancelled => return Ok(()),
                DeployOutcome::Config(e) => return self.fail(intent, "deploying", e).await,
                DeployOutcome::Transient(e) => {
                    intent.retry_count += 1;
                    attempts += 1;
                    intent.log_step("deploying", StepOutcome::Failed, Some(e.to_string()));
                    intent_repository::update(&self.pool, &intent).await?;

                    if attempts >= MAX_TRANSIENT_RETRIES {
                        let err = EngineError::PlatformApply(format!(
                            "giving up after {} attempt(s): {}",
                            attempts, e
                        ));
                        return self.fail(intent, "deploying", err).await;
                    }

                    warn!(
                        "Intent {} hit a transient error (attempt {}/{}): {}",
                        intent.id, attempts, MAX_TRANSIENT_RETRIES, e
                    );
                }
            }
        }

        intent.status = IntentStatus::Completed;
        intent.log_step("completed", StepOutcome::Succeeded, None);
        intent_repository::update(&self.pool, &intent).await?;

        info!("Intent {} completed", intent.id);
        Ok(())
    }

    /// One pass over the deploy stage, resuming at the first plan entry
    /// without resource references.
    async fn deploy(
        &self,
        intent: &mut DeploymentIntent,
        parsed: &ParsedIntent,
        executor: &dyn PlatformExecutor,
    ) -> Result<DeployOutcome, sqlx::Error> {
        match parsed.action {
            IntentAction::Scale => self.deploy_scale(intent, parsed, executor).await,
            IntentAction::Remove => self.deploy_remove(intent, executor).await,
            _ => self.deploy_install(intent, executor).await,
        }
    }

    async fn deploy_install(
        &self,
        intent: &mut DeploymentIntent,
        executor: &dyn PlatformExecutor,
    ) -> Result<DeployOutcome, sqlx::Error> {
        let order: Vec<String> = intent
            .plan
            .iter()
            .map(|e| e.blueprint_name.clone())
            .collect();
        let hard = match pipeline::hard_dependencies(&self.store, &order) {
            Ok(hard) => hard,
            Err(e) => return Ok(DeployOutcome::Config(e)),
        };

        if let Some(resume) = intent.first_incomplete_entry() {
            if resume > 0 {
                info!(
                    "Intent {}: resuming at plan entry {} of {}",
                    intent.id,
                    resume + 1,
                    intent.plan.len()
                );
            }
        }

        for index in 0..intent.plan.len() {
            if intent.plan[index].is_applied() {
                debug!(
                    "Intent {}: {} already applied, skipping",
                    intent.id, intent.plan[index].blueprint_name
                );
                continue;
            }

            if self.cancel_requested(intent.id).await? {
                intent.status = IntentStatus::Cancelled;
                intent.log_step(
                    "deploying",
                    StepOutcome::Skipped,
                    Some(format!(
                        "cancelled before {}",
                        intent.plan[index].blueprint_name
                    )),
                );
                intent_repository::update(&self.pool, intent).await?;
                info!("Intent {} cancelled during deploy", intent.id);
                return Ok(DeployOutcome::Cancelled);
            }

            let name = intent.plan[index].blueprint_name.clone();
            info!(
                "Intent {}: applying {} ({}/{})",
                intent.id,
                name,
                index + 1,
                intent.plan.len()
            );

            let result = deploy_entry(
                &intent.plan[index],
                executor,
                &intent.namespace,
                hard.contains(&name),
                READY_TIMEOUT,
            )
            .await;

            match result {
                Ok(EntryResult { refs, warning }) => {
                    let step = format!("deploy:{}", name);
                    match warning {
                        Some(warning) => {
                            intent.log_step(&step, StepOutcome::Warning, Some(warning))
                        }
                        None => intent.log_step(
                            &step,
                            StepOutcome::Succeeded,
                            Some(format!("{} resource(s) applied", refs.len())),
                        ),
                    }
                    intent.plan[index].resource_refs = refs;
                    intent_repository::update(&self.pool, intent).await?;
                }
                Err(e) if e.is_transient() => return Ok(DeployOutcome::Transient(e)),
                Err(e) => return Ok(DeployOutcome::Config(e)),
            }
        }

        Ok(DeployOutcome::Completed)
    }

    async fn deploy_scale(
        &self,
        intent: &mut DeploymentIntent,
        parsed: &ParsedIntent,
        executor: &dyn PlatformExecutor,
    ) -> Result<DeployOutcome, sqlx::Error> {
        let replicas = parsed
            .parameters
            .get("replicas")
            .and_then(|r| r.parse::<u32>().ok())
            .unwrap_or(1);

        match executor
            .scale(&intent.namespace, &intent.application, replicas)
            .await
        {
            Ok(()) => {
                let kind = match intent.platform {
                    Platform::Kubernetes => "Deployment",
                    Platform::Compose => "compose-service",
                };
                let reference = ResourceReference::new(
                    kind,
                    &intent.application,
                    &intent.namespace,
                    intent.platform,
                );
                if let Some(entry) = intent.plan.first_mut() {
                    if !entry.is_applied() {
                        entry.resource_refs.push(reference);
                    }
                }
                intent.log_step(
                    "deploy:scale",
                    StepOutcome::Succeeded,
                    Some(format!(
                        "{} scaled to {} replica(s)",
                        intent.application, replicas
                    )),
                );
                intent_repository::update(&self.pool, intent).await?;
                Ok(DeployOutcome::Completed)
            }
            Err(e) if e.is_transient() => Ok(DeployOutcome::Transient(e)),
            Err(e) => Ok(DeployOutcome::Config(e)),
        }
    }

    async fn deploy_remove(
        &self,
        intent: &mut DeploymentIntent,
        executor: &dyn PlatformExecutor,
    ) -> Result<DeployOutcome, sqlx::Error> {
        for index in 0..intent.plan.len() {
            if intent.plan[index].is_applied() {
                continue;
            }

            let name = intent.plan[index].blueprint_name.clone();
            let refs = match manifest::extract_references(
                &intent.plan[index].manifests,
                intent.platform,
                &intent.namespace,
            ) {
                Ok(refs) => refs,
                Err(e) => return Ok(DeployOutcome::Config(e)),
            };

            match executor.remove(&refs).await {
                Ok(()) => {
                    intent.log_step(
                        &format!("remove:{}", name),
                        StepOutcome::Succeeded,
                        Some(format!("{} resource(s) removed", refs.len())),
                    );
                    intent.plan[index].resource_refs = refs;
                    intent_repository::update(&self.pool, intent).await?;
                }
                Err(e) if e.is_transient() => return Ok(DeployOutcome::Transient(e)),
                Err(e) => return Ok(DeployOutcome::Config(e)),
            }
        }

        Ok(DeployOutcome::Completed)
    }

    async fn cancel_requested(&self, intent_id: Uuid) -> Result<bool, sqlx::Error> {
        Ok(intent_repository::cancel_state(&self.pool, intent_id)
            .await?
            .is_some_and(|(status, requested)| requested || status == IntentStatus::Cancelled))
    }

    /// Between-stage cancellation check; finalizes the record when a
    /// cancel was requested.
    async fn finish_if_cancelled(
        &self,
        intent: &mut DeploymentIntent,
    ) -> Result<bool, sqlx::Error> {
        if !self.cancel_requested(intent.id).await? {
            return Ok(false);
        }

        intent.status = IntentStatus::Cancelled;
        intent.log_step("cancelled", StepOutcome::Skipped, None);
        intent_repository::update(&self.pool, intent).await?;

        info!("Intent {} cancelled", intent.id);
        Ok(true)
    }

    /// Move the intent to failed. Configuration errors land here directly
    /// and never touch the retry count.
    async fn fail(
        &self,
        mut intent: DeploymentIntent,
        step: &str,
        error: EngineError,
    ) -> Result<(), sqlx::Error> {
        error!("Intent {} failed during {}: {}", intent.id, step, error);

        intent.status = IntentStatus::Failed;
        intent.log_step(step, StepOutcome::Failed, Some(error.to_string()));
        intent_repository::update(&self.pool, &intent).await
    }
}

/// Apply one plan entry and wait for readiness.
///
/// A readiness timeout fails the entry only when it is a hard dependency
/// (a later entry's wiring points at it); otherwise the timeout is
/// surfaced as a warning and the plan continues. On a hard timeout the
/// entry's references are not recorded, so a retry re-applies (idempotent)
/// and re-waits.
pub async fn deploy_entry(
    entry: &PlanEntry,
    executor: &dyn PlatformExecutor,
    namespace: &str,
    is_hard_dependency: bool,
    ready_timeout: Duration,
) -> Result<EntryResult, EngineError> {
    let refs = executor.apply(namespace, &entry.manifests).await?;
    let ready = executor.wait_ready(&refs, ready_timeout).await?;

    if ready.all_ready() {
        return Ok(EntryResult {
            refs,
            warning: None,
        });
    }

    if is_hard_dependency {
        return Err(EngineError::ReadinessTimeout(entry.blueprint_name.clone()));
    }

    let warning = format!(
        "readiness timed out for {} resource(s), continuing",
        ready.timed_out.len()
    );
    Ok(EntryResult {
        refs,
        warning: Some(warning),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use deckhand_core::domain::blueprint::Platform;
    use deckhand_core::domain::resource::ReadyResult;
    use std::sync::Mutex;

    /// Recording fake: applies succeed unless the blueprint's manifest
    /// carries the poison marker; readiness can be forced to time out.
    struct FakeExecutor {
        applied: Mutex<Vec<String>>,
        fail_on: Option<String>,
        time_out_on: Option<String>,
    }

    impl FakeExecutor {
        fn new() -> Self {
            Self {
                applied: Mutex::new(vec![]),
                fail_on: None,
                time_out_on: None,
            }
        }

        fn applied(&self) -> Vec<String> {
            self.applied.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PlatformExecutor for FakeExecutor {
        async fn apply(
            &self,
            namespace: &str,
            manifests: &[String],
        ) -> Result<Vec<ResourceReference>, EngineError> {
            let name = manifests
                .first()
                .and_then(|m| m.lines().find_map(|l| l.strip_prefix("  name: ")))
                .unwrap_or("unknown")
                .to_string();

            if self.fail_on.as_deref() == Some(name.as_str()) {
                return Err(EngineError::PlatformApply(format!("{} exploded", name)));
            }

            self.applied.lock().unwrap().push(name.clone());
            Ok(vec![ResourceReference::new(
                "Deployment",
                name,
                namespace,
                Platform::Kubernetes,
            )])
        }

        async fn wait_ready(
            &self,
            refs: &[ResourceReference],
            _timeout: Duration,
        ) -> Result<ReadyResult, EngineError> {
            let mut result = ReadyResult::default();
            for reference in refs {
                if self.time_out_on.as_deref() == Some(reference.name.as_str()) {
                    result.timed_out.push(reference.clone());
                } else {
                    result.ready.push(reference.clone());
                }
            }
            Ok(result)
        }

        async fn scale(&self, _: &str, workload: &str, replicas: u32) -> Result<(), EngineError> {
            self.applied
                .lock()
                .unwrap()
                .push(format!("scale:{}={}", workload, replicas));
            Ok(())
        }

        async fn remove(&self, refs: &[ResourceReference]) -> Result<(), EngineError> {
            for reference in refs {
                self.applied
                    .lock()
                    .unwrap()
                    .push(format!("remove:{}", reference.name));
            }
            Ok(())
        }
    }

    fn manifest_for(name: &str) -> String {
        format!("kind: Deployment\nmetadata:\n  name: {}", name)
    }

    fn plan_of(names: &[&str]) -> Vec<PlanEntry> {
        names
            .iter()
            .map(|n| PlanEntry::new(*n, vec![manifest_for(n)]))
            .collect()
    }

    /// Mirror of the worker's deploy loop without persistence, used to
    /// exercise resume semantics against the fake executor.
    async fn drive(plan: &mut [PlanEntry], executor: &FakeExecutor) -> Result<(), EngineError> {
        for entry in plan.iter_mut() {
            if entry.is_applied() {
                continue;
            }
            let result =
                deploy_entry(entry, executor, "default", false, Duration::from_secs(1)).await?;
            entry.resource_refs = result.refs;
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_failure_resumes_at_failed_entry() {
        let mut plan = plan_of(&["postgresql", "redis", "authentik"]);

        // First run: node 2 fails, node 1 was applied, node 3 untouched.
        let failing = FakeExecutor {
            fail_on: Some("redis".to_string()),
            ..FakeExecutor::new()
        };
        let err = drive(&mut plan, &failing).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(failing.applied(), vec!["postgresql"]);
        assert!(plan[0].is_applied());
        assert!(!plan[1].is_applied());
        assert!(!plan[2].is_applied());

        let first_refs = plan[0].resource_refs.clone();

        // Retry: only nodes 2 and 3 are re-attempted.
        let healed = FakeExecutor::new();
        drive(&mut plan, &healed).await.unwrap();
        assert_eq!(healed.applied(), vec!["redis", "authentik"]);
        assert_eq!(plan[0].resource_refs, first_refs);
        assert!(plan.iter().all(|e| e.is_applied()));
    }

    #[tokio::test]
    async fn test_reapply_is_reference_level_noop() {
        let mut plan = plan_of(&["nginx"]);
        let executor = FakeExecutor::new();

        drive(&mut plan, &executor).await.unwrap();
        let refs = plan[0].resource_refs.clone();

        // Second full pass: the applied entry is skipped outright, so no
        // new references appear.
        drive(&mut plan, &executor).await.unwrap();
        assert_eq!(executor.applied(), vec!["nginx"]);
        assert_eq!(plan[0].resource_refs, refs);
    }

    #[tokio::test]
    async fn test_soft_readiness_timeout_is_warning() {
        let executor = FakeExecutor {
            time_out_on: Some("nginx".to_string()),
            ..FakeExecutor::new()
        };
        let entry = PlanEntry::new("nginx", vec![manifest_for("nginx")]);

        let result = deploy_entry(&entry, &executor, "default", false, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(result.warning.is_some());
        assert!(!result.refs.is_empty());
    }

    #[tokio::test]
    async fn test_hard_readiness_timeout_fails_entry() {
        let executor = FakeExecutor {
            time_out_on: Some("postgresql".to_string()),
            ..FakeExecutor::new()
        };
        let entry = PlanEntry::new("postgresql", vec![manifest_for("postgresql")]);

        let err = deploy_entry(&entry, &executor, "default", true, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ReadinessTimeout(name) if name == "postgresql"));
    }
}
