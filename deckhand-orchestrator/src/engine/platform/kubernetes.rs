//! Kubernetes adapter
//!
//! Applies rendered resource documents through `kubectl apply`, which makes
//! re-application a server-side no-op or safe update. Readiness is polled
//! per workload with a bounded timeout; a timeout is reported, never
//! blocked on.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use deckhand_core::domain::blueprint::Platform;
use deckhand_core::domain::resource::{ReadyResult, ResourceReference};

use crate::engine::error::{EngineError, Result};
use crate::engine::manifest;
use crate::engine::platform::PlatformExecutor;

pub struct KubernetesExecutor {
    kubectl: String,
}

impl KubernetesExecutor {
    pub fn new(kubectl: impl Into<String>) -> Self {
        Self {
            kubectl: kubectl.into(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var("KUBECTL_BIN").unwrap_or_else(|_| "kubectl".to_string()))
    }

    async fn run(&self, args: &[&str], stdin: Option<&str>) -> Result<String> {
        debug!("Running {} {}", self.kubectl, args.join(" "));

        let mut command = Command::new(&self.kubectl);
        command
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| EngineError::PlatformApply(format!("failed to run kubectl: {}", e)))?;

        if let (Some(input), Some(mut handle)) = (stdin, child.stdin.take()) {
            handle.write_all(input.as_bytes()).await.map_err(|e| {
                EngineError::PlatformApply(format!("failed to write to kubectl: {}", e))
            })?;
            drop(handle);
        }

        let output = child.wait_with_output().await.map_err(|e| {
            EngineError::PlatformApply(format!("failed to wait for kubectl: {}", e))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(EngineError::PlatformApply(format!(
                "kubectl {} failed: {}",
                args.first().copied().unwrap_or(""),
                stderr.trim()
            )));
        }

        Ok(stdout)
    }

    async fn ensure_namespace(&self, namespace: &str) -> Result<()> {
        match self.run(&["create", "namespace", namespace], None).await {
            Ok(_) => Ok(()),
            Err(EngineError::PlatformApply(msg)) if msg.contains("AlreadyExists") => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Apply order: namespace first, then config/secrets, storage, workloads,
/// networking last.
fn kind_rank(document: &str) -> usize {
    let kind = serde_yaml::from_str::<serde_yaml::Value>(document)
        .ok()
        .and_then(|v| v.get("kind").and_then(|k| k.as_str()).map(String::from))
        .unwrap_or_default();

    match kind.as_str() {
        "Namespace" => 0,
        "Secret" | "ConfigMap" => 1,
        "PersistentVolumeClaim" => 2,
        "Deployment" | "StatefulSet" | "DaemonSet" => 3,
        "Service" => 4,
        "Ingress" => 5,
        _ => 6,
    }
}

#[async_trait]
impl PlatformExecutor for KubernetesExecutor {
    async fn apply(
        &self,
        namespace: &str,
        manifests: &[String],
    ) -> Result<Vec<ResourceReference>> {
        let refs = manifest::extract_references(manifests, Platform::Kubernetes, namespace)?;

        self.ensure_namespace(namespace).await?;

        let mut ordered: Vec<&String> = manifests.iter().collect();
        ordered.sort_by_key(|doc| kind_rank(doc));
        let payload = ordered
            .iter()
            .map(|doc| doc.as_str())
            .collect::<Vec<_>>()
            .join("\n---\n");

        self.run(&["apply", "-n", namespace, "-f", "-"], Some(&payload))
            .await?;

        debug!("Applied {} resource(s) in namespace {}", refs.len(), namespace);
        Ok(refs)
    }

    async fn wait_ready(
        &self,
        refs: &[ResourceReference],
        timeout: Duration,
    ) -> Result<ReadyResult> {
        let mut result = ReadyResult::default();
        let timeout_arg = format!("--timeout={}s", timeout.as_secs());

        for reference in refs {
            match reference.kind.as_str() {
                "Deployment" | "StatefulSet" | "DaemonSet" => {
                    let target = format!("{}/{}", reference.kind.to_lowercase(), reference.name);
                    let rollout = self
                        .run(
                            &[
                                "rollout",
                                "status",
                                &target,
                                "-n",
                                &reference.namespace,
                                &timeout_arg,
                            ],
                            None,
                        )
                        .await;

                    match rollout {
                        Ok(_) => result.ready.push(reference.clone()),
                        Err(e) => {
                            warn!("Readiness wait for {} did not complete: {}", target, e);
                            result.timed_out.push(reference.clone());
                        }
                    }
                }
                // Non-workload resources are ready once applied.
                _ => result.ready.push(reference.clone()),
            }
        }

        Ok(result)
    }

    async fn scale(&self, namespace: &str, workload: &str, replicas: u32) -> Result<()> {
        let target = format!("deployment/{}", workload);
        let replicas_arg = format!("--replicas={}", replicas);

        self.run(&["scale", &target, "-n", namespace, &replicas_arg], None)
            .await?;

        Ok(())
    }

    async fn remove(&self, refs: &[ResourceReference]) -> Result<()> {
        // Reverse apply order: networking first, namespace-scoped workloads
        // and storage after.
        for reference in refs.iter().rev() {
            self.run(
                &[
                    "delete",
                    &reference.kind.to_lowercase(),
                    &reference.name,
                    "-n",
                    &reference.namespace,
                    "--ignore-not-found",
                ],
                None,
            )
            .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_rank_ordering() {
        let namespace = "kind: Namespace\nmetadata:\n  name: web";
        let secret = "kind: Secret\nmetadata:\n  name: app-secrets";
        let pvc = "kind: PersistentVolumeClaim\nmetadata:\n  name: app-data";
        let deployment = "kind: Deployment\nmetadata:\n  name: app";
        let service = "kind: Service\nmetadata:\n  name: app";
        let ingress = "kind: Ingress\nmetadata:\n  name: app";

        let mut docs = vec![ingress, deployment, secret, namespace, service, pvc];
        docs.sort_by_key(|doc| kind_rank(doc));

        assert_eq!(docs, vec![namespace, secret, pvc, deployment, service, ingress]);
    }
}
