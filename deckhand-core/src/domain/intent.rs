//! Deployment intent domain types
//!
//! A `DeploymentIntent` is the durable record of one deployment attempt. It
//! is created on submission and mutated exclusively by the orchestrator as
//! the pipeline advances; terminal intents are retained for audit and retry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::blueprint::Platform;
use crate::domain::resource::ResourceReference;
use crate::domain::variables::ResolvedVariables;

/// Deployment action vocabulary. Closed set; anything else parses as
/// `Unknown` with zero confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentAction {
    Install,
    Scale,
    Update,
    Remove,
    Unknown,
}

/// Structured interpretation of a raw deployment command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedIntent {
    pub action: IntentAction,
    pub application: String,
    /// Parser confidence in [0, 1]. Low confidence is surfaced to the
    /// caller, not rejected.
    pub confidence: f64,
    pub parameters: BTreeMap<String, String>,
    /// Direct dependencies of the matched blueprint, if one matched.
    pub dependencies_hint: Vec<String>,
    pub suggested_platform: Option<Platform>,
}

/// Intent lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    Pending,
    Parsing,
    Resolving,
    Generating,
    Deploying,
    Completed,
    Failed,
    Cancelled,
}

impl IntentStatus {
    /// Terminal states are retained but never advanced.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IntentStatus::Completed | IntentStatus::Failed | IntentStatus::Cancelled
        )
    }

    /// States from which an explicit cancel takes effect immediately.
    /// A deploying intent is only cancelled cooperatively, between steps.
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            IntentStatus::Pending
                | IntentStatus::Parsing
                | IntentStatus::Resolving
                | IntentStatus::Generating
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Pending => "pending",
            IntentStatus::Parsing => "parsing",
            IntentStatus::Resolving => "resolving",
            IntentStatus::Generating => "generating",
            IntentStatus::Deploying => "deploying",
            IntentStatus::Completed => "completed",
            IntentStatus::Failed => "failed",
            IntentStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for IntentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(IntentStatus::Pending),
            "parsing" => Ok(IntentStatus::Parsing),
            "resolving" => Ok(IntentStatus::Resolving),
            "generating" => Ok(IntentStatus::Generating),
            "deploying" => Ok(IntentStatus::Deploying),
            "completed" => Ok(IntentStatus::Completed),
            "failed" => Ok(IntentStatus::Failed),
            "cancelled" => Ok(IntentStatus::Cancelled),
            other => Err(format!("unknown intent status: {}", other)),
        }
    }
}

/// One node of the deployment plan: a resolved blueprint with its rendered
/// manifests and, once applied, the references of the resources created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanEntry {
    pub blueprint_name: String,
    pub manifests: Vec<String>,
    /// Empty until this entry's manifests have been applied. Retry resumes
    /// at the first entry where this is still empty.
    #[serde(default)]
    pub resource_refs: Vec<ResourceReference>,
}

impl PlanEntry {
    pub fn new(blueprint_name: impl Into<String>, manifests: Vec<String>) -> Self {
        Self {
            blueprint_name: blueprint_name.into(),
            manifests,
            resource_refs: vec![],
        }
    }

    pub fn is_applied(&self) -> bool {
        !self.resource_refs.is_empty()
    }
}

/// Outcome recorded for one pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Succeeded,
    Failed,
    /// Step finished but degraded (e.g. readiness wait timed out on a
    /// non-critical resource).
    Warning,
    /// Step not executed (already complete on resume, or cancelled).
    Skipped,
}

/// Timestamped record of one pipeline step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub step: String,
    pub outcome: StepOutcome,
    /// Human-readable detail. Never contains secret values, only keys.
    pub detail: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ExecutionLogEntry {
    pub fn now(step: impl Into<String>, outcome: StepOutcome, detail: Option<String>) -> Self {
        Self {
            step: step.into(),
            outcome,
            detail,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Durable record of one deployment attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentIntent {
    pub id: Uuid,
    pub raw_command: String,
    /// Target application name, denormalized from `parsed` for the
    /// one-active-intent-per-application check.
    pub application: String,
    pub status: IntentStatus,
    pub platform: Platform,
    pub namespace: String,
    pub parsed: Option<ParsedIntent>,
    pub resolved_variables: BTreeMap<String, ResolvedVariables>,
    pub plan: Vec<PlanEntry>,
    pub execution_log: Vec<ExecutionLogEntry>,
    pub retry_count: u32,
    pub cancel_requested: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl DeploymentIntent {
    pub fn new(
        raw_command: impl Into<String>,
        application: impl Into<String>,
        platform: Platform,
        namespace: impl Into<String>,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4(),
            raw_command: raw_command.into(),
            application: application.into(),
            status: IntentStatus::Pending,
            platform,
            namespace: namespace.into(),
            parsed: None,
            resolved_variables: BTreeMap::new(),
            plan: vec![],
            execution_log: vec![],
            retry_count: 0,
            cancel_requested: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Index of the first plan entry that has not been applied yet.
    /// `None` once every entry carries resource references.
    pub fn first_incomplete_entry(&self) -> Option<usize> {
        self.plan.iter().position(|entry| !entry.is_applied())
    }

    pub fn log_step(&mut self, step: &str, outcome: StepOutcome, detail: Option<String>) {
        self.execution_log
            .push(ExecutionLogEntry::now(step, outcome, detail));
        self.updated_at = chrono::Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(IntentStatus::Completed.is_terminal());
        assert!(IntentStatus::Failed.is_terminal());
        assert!(IntentStatus::Cancelled.is_terminal());
        assert!(!IntentStatus::Pending.is_terminal());
        assert!(!IntentStatus::Deploying.is_terminal());
    }

    #[test]
    fn test_cancellable_states() {
        assert!(IntentStatus::Pending.can_cancel());
        assert!(IntentStatus::Generating.can_cancel());
        assert!(!IntentStatus::Deploying.can_cancel());
        assert!(!IntentStatus::Completed.can_cancel());
    }

    #[test]
    fn test_first_incomplete_entry_skips_applied() {
        let mut intent = DeploymentIntent::new(
            "install authentik",
            "authentik",
            Platform::Kubernetes,
            "default",
        );
        intent.plan = vec![
            PlanEntry::new("postgresql", vec!["kind: Deployment".to_string()]),
            PlanEntry::new("authentik", vec!["kind: Deployment".to_string()]),
        ];
        intent.plan[0].resource_refs.push(ResourceReference::new(
            "Deployment",
            "postgresql",
            "default",
            Platform::Kubernetes,
        ));

        assert_eq!(intent.first_incomplete_entry(), Some(1));

        intent.plan[1].resource_refs.push(ResourceReference::new(
            "Deployment",
            "authentik",
            "default",
            Platform::Kubernetes,
        ));
        assert_eq!(intent.first_incomplete_entry(), None);
    }
}
