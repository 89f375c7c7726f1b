//! Intent DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::blueprint::Platform;
use crate::domain::intent::{DeploymentIntent, IntentStatus};

/// Intent summary for listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentDto {
    pub id: Uuid,
    pub raw_command: String,
    pub application: String,
    pub status: IntentStatus,
    pub platform: Platform,
    pub namespace: String,
    pub retry_count: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<&DeploymentIntent> for IntentDto {
    fn from(intent: &DeploymentIntent) -> Self {
        Self {
            id: intent.id,
            raw_command: intent.raw_command.clone(),
            application: intent.application.clone(),
            status: intent.status,
            platform: intent.platform,
            namespace: intent.namespace.clone(),
            retry_count: intent.retry_count,
            created_at: intent.created_at,
            updated_at: intent.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_dto_conversion() {
        let intent = DeploymentIntent::new(
            "install nginx",
            "nginx",
            Platform::Kubernetes,
            "default",
        );

        let dto = IntentDto::from(&intent);
        assert_eq!(dto.id, intent.id);
        assert_eq!(dto.application, "nginx");
        assert_eq!(dto.status, IntentStatus::Pending);
    }
}
