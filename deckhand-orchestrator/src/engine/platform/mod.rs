//! Platform executors
//!
//! Adapters that apply rendered manifests against a concrete platform and
//! wait for readiness. Both adapters are idempotent: re-applying identical
//! manifests for the same resource names is a safe update, never a
//! duplicate-create error.

pub mod compose;
pub mod kubernetes;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use deckhand_core::domain::blueprint::Platform;
use deckhand_core::domain::resource::{ReadyResult, ResourceReference};

use crate::engine::error::Result;

#[async_trait]
pub trait PlatformExecutor: Send + Sync {
    /// Apply manifests in the order given, returning one reference per
    /// resource actually applied.
    async fn apply(&self, namespace: &str, manifests: &[String])
    -> Result<Vec<ResourceReference>>;

    /// Poll readiness of the given references up to `timeout`. Never
    /// blocks past the timeout; resources that did not become ready are
    /// reported in `timed_out`.
    async fn wait_ready(
        &self,
        refs: &[ResourceReference],
        timeout: Duration,
    ) -> Result<ReadyResult>;

    /// Update the replica count of an existing workload.
    async fn scale(&self, namespace: &str, workload: &str, replicas: u32) -> Result<()>;

    /// Tear down previously applied resources.
    async fn remove(&self, refs: &[ResourceReference]) -> Result<()>;
}

/// The adapter pair, selected per intent.
#[derive(Clone)]
pub struct ExecutorSet {
    kubernetes: Arc<dyn PlatformExecutor>,
    compose: Arc<dyn PlatformExecutor>,
}

impl ExecutorSet {
    pub fn new(kubernetes: Arc<dyn PlatformExecutor>, compose: Arc<dyn PlatformExecutor>) -> Self {
        Self {
            kubernetes,
            compose,
        }
    }

    /// Build both adapters from environment configuration.
    pub fn from_env() -> Self {
        Self::new(
            Arc::new(kubernetes::KubernetesExecutor::from_env()),
            Arc::new(compose::ComposeExecutor::from_env()),
        )
    }

    pub fn for_platform(&self, platform: Platform) -> Arc<dyn PlatformExecutor> {
        match platform {
            Platform::Kubernetes => Arc::clone(&self.kubernetes),
            Platform::Compose => Arc::clone(&self.compose),
        }
    }
}
