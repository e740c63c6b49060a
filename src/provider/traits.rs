use async_trait::async_trait;
use tokio::time::Instant;

use super::AppContext;
use crate::types::PriorityTier;

/// A pluggable unit of application functionality.
///
/// Identity is explicit: two instances of the same type may coexist under different
/// identities, and renaming a type never changes how a provider is tracked.
#[async_trait]
pub trait Provider: Send + Sync {
    fn identity(&self) -> &str;

    fn priority(&self) -> i32 {
        PriorityTier::Application.value()
    }

    fn is_deferred(&self) -> bool {
        false
    }

    /// Services this provider can satisfy lazily. Only consulted when [`is_deferred`](Self::is_deferred) is true.
    fn provides(&self) -> Vec<String> {
        Vec::new()
    }

    /// Events that load this provider on first fire.
    fn when(&self) -> Vec<String> {
        Vec::new()
    }

    fn terminable(&self) -> bool {
        false
    }

    async fn register(&self, app: &AppContext) -> anyhow::Result<()>;

    async fn boot(&self, _app: &AppContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Only called when [`terminable`](Self::terminable) is true. `deadline` is the
    /// shutdown deadline; the call is cut off when it passes.
    async fn terminate(&self, _deadline: Instant, _app: &AppContext) -> anyhow::Result<()> {
        Ok(())
    }
}
