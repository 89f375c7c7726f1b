//! Engine error taxonomy
//!
//! Configuration-class errors abort an intent immediately without consuming
//! a retry attempt; transient platform errors are eligible for bounded
//! retry. Error messages may name secret keys, never secret values.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Command was empty or carried no recognizable action token.
    #[error("could not parse command: {0}")]
    IntentParse(String),

    #[error("blueprint not found: {0}")]
    BlueprintNotFound(String),

    #[error("invalid blueprint {name}: {reason}")]
    BlueprintInvalid { name: String, reason: String },

    #[error("platform {platform} is not supported by blueprint {blueprint}")]
    PlatformUnsupported { blueprint: String, platform: String },

    #[error("dependency cycle: {}", cycle_path.join(" -> "))]
    DependencyCycle { cycle_path: Vec<String> },

    /// A requirement (e.g. a database) has no resolved dependency providing it.
    #[error("unresolved requirement for {blueprint}: no dependency provides {requirement}")]
    UnresolvedRequirement {
        blueprint: String,
        requirement: String,
    },

    #[error("manifest render failed for {blueprint}: {reason}")]
    ManifestRender { blueprint: String, reason: String },

    #[error("platform apply failed: {0}")]
    PlatformApply(String),

    #[error("readiness wait timed out for {0}")]
    ReadinessTimeout(String),

    #[error("blueprint store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Transient errors increment the retry count and are re-attempted;
    /// everything else is a configuration error and fails fast.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::PlatformApply(_) | EngineError::ReadinessTimeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(EngineError::PlatformApply("connection refused".into()).is_transient());
        assert!(EngineError::ReadinessTimeout("nginx".into()).is_transient());

        assert!(!EngineError::BlueprintNotFound("ghost".into()).is_transient());
        assert!(
            !EngineError::DependencyCycle {
                cycle_path: vec!["a".into(), "b".into(), "a".into()]
            }
            .is_transient()
        );
        assert!(!EngineError::IntentParse("empty".into()).is_transient());
    }

    #[test]
    fn test_cycle_message_names_path() {
        let err = EngineError::DependencyCycle {
            cycle_path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle: a -> b -> a");
    }
}
