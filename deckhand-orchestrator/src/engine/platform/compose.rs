//! Compose adapter
//!
//! Merges rendered service fragments into one compose document per
//! namespace (a compose project) and drives `docker compose up -d`, which
//! is idempotent for unchanged services. Readiness is approximated via the
//! container health-check status when one is defined, else a fixed grace
//! period.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use deckhand_core::domain::blueprint::Platform;
use deckhand_core::domain::resource::{ReadyResult, ResourceReference};

use crate::engine::error::{EngineError, Result};
use crate::engine::manifest;
use crate::engine::platform::PlatformExecutor;

const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct ComposeExecutor {
    docker: String,
    state_dir: PathBuf,
    /// Readiness fallback for services without a health check.
    grace_period: Duration,
}

impl ComposeExecutor {
    pub fn new(docker: impl Into<String>, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            docker: docker.into(),
            state_dir: state_dir.into(),
            grace_period: Duration::from_secs(10),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            std::env::var("DOCKER_BIN").unwrap_or_else(|_| "docker".to_string()),
            std::env::var("DECKHAND_STATE_DIR").unwrap_or_else(|_| "./state".to_string()),
        )
    }

    fn project_file(&self, namespace: &str) -> PathBuf {
        self.state_dir.join(namespace).join("docker-compose.yaml")
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!("Running {} {}", self.docker, args.join(" "));

        let output = Command::new(&self.docker)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| EngineError::PlatformApply(format!("failed to run docker: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(EngineError::PlatformApply(format!(
                "docker {} failed: {}",
                args.first().copied().unwrap_or(""),
                stderr.trim()
            )));
        }

        Ok(stdout)
    }

    async fn compose_up(&self, namespace: &str, file: &Path) -> Result<()> {
        let file_arg = file.display().to_string();
        self.run(&[
            "compose",
            "-p",
            namespace,
            "-f",
            &file_arg,
            "up",
            "-d",
            "--remove-orphans",
        ])
        .await?;
        Ok(())
    }

    /// Health status of a compose service container, if inspectable.
    async fn health_status(&self, namespace: &str, service: &str) -> Option<String> {
        let container = format!("{}-{}-1", namespace, service);
        let output = self
            .run(&[
                "inspect",
                "--format",
                "{{if .State.Health}}{{.State.Health.Status}}{{else}}none{{end}}",
                &container,
            ])
            .await
            .ok()?;

        Some(output.trim().to_string())
    }
}

/// Merge a service fragment into the accumulated compose document. Service
/// and volume keys overwrite in place, which is what makes re-application
/// converge instead of duplicating.
fn merge_fragment(document: &mut serde_yaml::Mapping, fragment: &str) -> Result<()> {
    let fragment: serde_yaml::Value = serde_yaml::from_str(fragment)
        .map_err(|e| EngineError::PlatformApply(format!("unparseable compose fragment: {}", e)))?;

    let Some(fragment) = fragment.as_mapping() else {
        return Err(EngineError::PlatformApply(
            "compose fragment is not a mapping".to_string(),
        ));
    };

    for section in ["services", "volumes", "networks"] {
        let key = serde_yaml::Value::from(section);
        let Some(incoming) = fragment.get(&key).and_then(|v| v.as_mapping()) else {
            continue;
        };

        let target = document
            .entry(key)
            .or_insert_with(|| serde_yaml::Value::Mapping(Default::default()));
        if let Some(target) = target.as_mapping_mut() {
            for (name, value) in incoming {
                target.insert(name.clone(), value.clone());
            }
        }
    }

    Ok(())
}

#[async_trait]
impl PlatformExecutor for ComposeExecutor {
    async fn apply(
        &self,
        namespace: &str,
        manifests: &[String],
    ) -> Result<Vec<ResourceReference>> {
        let refs = manifest::extract_references(manifests, Platform::Compose, namespace)?;

        let file = self.project_file(namespace);
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut document = match std::fs::read_to_string(&file) {
            Ok(existing) => serde_yaml::from_str(&existing).map_err(|e| {
                EngineError::PlatformApply(format!("corrupt compose project file: {}", e))
            })?,
            Err(_) => serde_yaml::Mapping::new(),
        };

        for fragment in manifests {
            merge_fragment(&mut document, fragment)?;
        }

        let rendered = serde_yaml::to_string(&document)
            .map_err(|e| EngineError::PlatformApply(e.to_string()))?;
        std::fs::write(&file, rendered)?;

        self.compose_up(namespace, &file).await?;

        debug!("Applied {} compose service(s) in project {}", refs.len(), namespace);
        Ok(refs)
    }

    async fn wait_ready(
        &self,
        refs: &[ResourceReference],
        timeout: Duration,
    ) -> Result<ReadyResult> {
        let mut result = ReadyResult::default();
        let deadline = tokio::time::Instant::now() + timeout;

        for reference in refs {
            loop {
                match self
                    .health_status(&reference.namespace, &reference.name)
                    .await
                    .as_deref()
                {
                    Some("healthy") => {
                        result.ready.push(reference.clone());
                        break;
                    }
                    // No health check defined: allow a fixed grace period
                    // for the container to settle, then call it ready.
                    Some("none") | None => {
                        tokio::time::sleep(self.grace_period).await;
                        result.ready.push(reference.clone());
                        break;
                    }
                    Some(_) if tokio::time::Instant::now() >= deadline => {
                        warn!(
                            "Compose service {} did not become healthy in time",
                            reference.name
                        );
                        result.timed_out.push(reference.clone());
                        break;
                    }
                    Some(_) => tokio::time::sleep(HEALTH_POLL_INTERVAL).await,
                }
            }
        }

        Ok(result)
    }

    async fn scale(&self, namespace: &str, workload: &str, replicas: u32) -> Result<()> {
        let file = self.project_file(namespace);
        let file_arg = file.display().to_string();
        let scale_arg = format!("{}={}", workload, replicas);

        self.run(&[
            "compose", "-p", namespace, "-f", &file_arg, "up", "-d", "--scale", &scale_arg,
        ])
        .await?;

        Ok(())
    }

    async fn remove(&self, refs: &[ResourceReference]) -> Result<()> {
        for reference in refs {
            let file = self.project_file(&reference.namespace);
            let file_arg = file.display().to_string();

            self.run(&[
                "compose",
                "-p",
                &reference.namespace,
                "-f",
                &file_arg,
                "rm",
                "-s",
                "-f",
                &reference.name,
            ])
            .await?;

            // Drop the service from the project file so the next apply
            // does not resurrect it.
            if let Ok(existing) = std::fs::read_to_string(&file) {
                if let Ok(mut document) = serde_yaml::from_str::<serde_yaml::Mapping>(&existing) {
                    if let Some(services) = document
                        .get_mut(serde_yaml::Value::from("services"))
                        .and_then(|v| v.as_mapping_mut())
                    {
                        services.remove(serde_yaml::Value::from(reference.name.as_str()));
                    }
                    if let Ok(rendered) = serde_yaml::to_string(&document) {
                        let _ = std::fs::write(&file, rendered);
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_fragment_accumulates_services() {
        let mut document = serde_yaml::Mapping::new();

        merge_fragment(
            &mut document,
            "services:\n  postgresql:\n    image: postgres:16\nvolumes:\n  postgresql-data: {}\n",
        )
        .unwrap();
        merge_fragment(&mut document, "services:\n  redis:\n    image: redis:7\n").unwrap();

        let services = document
            .get(serde_yaml::Value::from("services"))
            .and_then(|v| v.as_mapping())
            .unwrap();
        assert_eq!(services.len(), 2);

        let volumes = document
            .get(serde_yaml::Value::from("volumes"))
            .and_then(|v| v.as_mapping())
            .unwrap();
        assert_eq!(volumes.len(), 1);
    }

    #[test]
    fn test_merge_fragment_is_idempotent() {
        let fragment = "services:\n  redis:\n    image: redis:7\n";
        let mut document = serde_yaml::Mapping::new();

        merge_fragment(&mut document, fragment).unwrap();
        let first = serde_yaml::to_string(&document).unwrap();

        merge_fragment(&mut document, fragment).unwrap();
        let second = serde_yaml::to_string(&document).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_merge_rejects_non_mapping_fragment() {
        let mut document = serde_yaml::Mapping::new();
        assert!(merge_fragment(&mut document, "- just\n- a\n- list\n").is_err());
    }
}
