use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::Activation;
use crate::Result;

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn listen(&self, event: &str, listener: Arc<dyn Activation>);
}

/// Minimal in-process bus. Listeners run sequentially in subscription order.
pub struct LocalEventBus {
    listeners: RwLock<HashMap<String, Vec<Arc<dyn Activation>>>>,
}

impl LocalEventBus {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// Runs every listener of `event` and returns how many ran.
    ///
    /// All listeners run even if one fails; the first failure is returned.
    pub async fn fire(&self, event: &str) -> Result<usize> {
        let listeners = match self.listeners.read().await.get(event) {
            Some(listeners) => listeners.clone(),
            None => return Ok(0),
        };

        tracing::debug!(event, count = listeners.len(), "Firing event");

        let mut first_error = None;
        for listener in &listeners {
            if let Err(e) = listener.activate().await {
                tracing::error!(event, provider = listener.provider(), "Event listener failed: {}", e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(listeners.len()),
        }
    }

    pub async fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .read()
            .await
            .get(event)
            .map_or(0, Vec::len)
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for LocalEventBus {
    async fn listen(&self, event: &str, listener: Arc<dyn Activation>) {
        self.listeners
            .write()
            .await
            .entry(event.to_string())
            .or_default()
            .push(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LifecycleError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Listener {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Activation for Listener {
        fn provider(&self) -> &str {
            "listener"
        }

        async fn activate(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LifecycleError::ProviderFailed("listener".into()));
            }
            Ok(())
        }
    }

    fn listener(fail: bool) -> Arc<Listener> {
        Arc::new(Listener {
            fail,
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_fire_without_listeners() {
        let bus = LocalEventBus::new();
        assert_eq!(bus.fire("nothing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failure_does_not_skip_later_listeners() {
        let bus = LocalEventBus::new();
        let failing = listener(true);
        let healthy = listener(false);
        bus.listen("user.created", failing.clone()).await;
        bus.listen("user.created", healthy.clone()).await;
        assert_eq!(bus.listener_count("user.created").await, 2);

        assert!(bus.fire("user.created").await.is_err());
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.calls.load(Ordering::SeqCst), 1);
    }
}
