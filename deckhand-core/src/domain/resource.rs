//! Applied resource tracking

use serde::{Deserialize, Serialize};

use crate::domain::blueprint::Platform;

/// Reference to a resource actually applied on a platform.
///
/// Recorded per manifest applied; used for idempotent re-application and
/// eventual teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceReference {
    /// Platform resource kind (e.g. "Deployment", "Service", "compose-service").
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub platform: Platform,
}

impl ResourceReference {
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
        platform: Platform,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.into(),
            platform,
        }
    }
}

/// Outcome of a readiness wait over a set of references.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadyResult {
    pub ready: Vec<ResourceReference>,
    pub timed_out: Vec<ResourceReference>,
}

impl ReadyResult {
    pub fn all_ready(&self) -> bool {
        self.timed_out.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_ready() {
        let reference =
            ResourceReference::new("Deployment", "nginx", "default", Platform::Kubernetes);

        let result = ReadyResult {
            ready: vec![reference.clone()],
            timed_out: vec![],
        };
        assert!(result.all_ready());

        let result = ReadyResult {
            ready: vec![],
            timed_out: vec![reference],
        };
        assert!(!result.all_ready());
    }
}
