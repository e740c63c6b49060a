use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Failed to register provider {provider}: {message}")]
    Register { provider: String, message: String },

    #[error("Failed to boot provider {provider}: {message}")]
    Boot { provider: String, message: String },

    #[error("Provider {0} failed to start earlier and will not be retried")]
    ProviderFailed(String),

    #[error("Provider {provider} termination failed: {message}")]
    Termination { provider: String, message: String },

    #[error("Provider {0} was not terminated before the shutdown deadline")]
    TerminationSkipped(String),

    #[error("Shutdown already in progress")]
    AlreadyInProgress,

    #[error("No provider found for service: {0}")]
    UnknownService(String),

    #[error("Provider not registered: {0}")]
    UnknownProvider(String),

    #[error("Shutdown callback '{name}' panicked: {message}")]
    CallbackPanic { name: String, message: String },

    #[error("Shutdown callback '{name}' failed: {message}")]
    CallbackFailed { name: String, message: String },

    #[error("Shutdown callback '{0}' did not finish before the shutdown deadline")]
    CallbackSkipped(String),

    #[error("Invalid transition for provider {provider}: {reason}")]
    InvalidTransition { provider: String, reason: String },

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Shutdown completed with {} errors", errors.len())]
    Shutdown { errors: Vec<LifecycleError> },
}

pub type Result<T> = std::result::Result<T, LifecycleError>;

impl LifecycleError {
    pub(crate) fn register(provider: &str, err: &anyhow::Error) -> Self {
        Self::Register {
            provider: provider.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub(crate) fn boot(provider: &str, err: &anyhow::Error) -> Self {
        Self::Boot {
            provider: provider.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub(crate) fn termination(provider: &str, err: &anyhow::Error) -> Self {
        Self::Termination {
            provider: provider.to_string(),
            message: format!("{err:#}"),
        }
    }

    /// Registration or boot failure; the application cannot reach a serving state.
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            Self::Register { .. } | Self::Boot { .. } | Self::ProviderFailed(_)
        )
    }

    pub fn is_termination(&self) -> bool {
        matches!(self, Self::Termination { .. } | Self::TerminationSkipped(_))
    }

    /// Errors collected by an aggregate shutdown failure, empty for any other variant.
    pub fn aggregated(&self) -> &[LifecycleError] {
        match self {
            Self::Shutdown { errors } => errors,
            _ => &[],
        }
    }
}

impl From<std::io::Error> for LifecycleError {
    fn from(e: std::io::Error) -> Self {
        LifecycleError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for LifecycleError {
    fn from(e: serde_json::Error) -> Self {
        LifecycleError::Manifest(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_classification() {
        let err = LifecycleError::register("cache", &anyhow::anyhow!("bind failed"));
        assert!(err.is_startup());
        assert!(!err.is_termination());
        assert!(LifecycleError::ProviderFailed("cache".into()).is_startup());
        assert!(!LifecycleError::AlreadyInProgress.is_startup());
    }

    #[test]
    fn test_context_chain_is_kept() {
        let inner = anyhow::anyhow!("connection refused").context("opening pool");
        let err = LifecycleError::boot("database", &inner);
        assert_eq!(
            err.to_string(),
            "Failed to boot provider database: opening pool: connection refused"
        );
    }

    #[test]
    fn test_aggregate_display() {
        let err = LifecycleError::Shutdown {
            errors: vec![
                LifecycleError::TerminationSkipped("queue".into()),
                LifecycleError::CallbackPanic {
                    name: "flush".into(),
                    message: "boom".into(),
                },
            ],
        };
        assert_eq!(err.to_string(), "Shutdown completed with 2 errors");
        assert_eq!(err.aggregated().len(), 2);
        assert!(LifecycleError::AlreadyInProgress.aggregated().is_empty());
    }
}
