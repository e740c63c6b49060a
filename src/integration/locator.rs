use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::Activation;
use crate::{LifecycleError, Result};

/// Container side of deferred loading: accepts one lazy-resolution hook per service name.
#[async_trait]
pub trait ServiceLocator: Send + Sync {
    async fn defer(&self, service: &str, activation: Arc<dyn Activation>);
}

/// In-process locator that runs the hook for a service before handing control back.
pub struct DeferredServices {
    hooks: RwLock<HashMap<String, Arc<dyn Activation>>>,
}

impl DeferredServices {
    pub fn new() -> Self {
        Self {
            hooks: RwLock::new(HashMap::new()),
        }
    }

    /// Ensures the provider behind `service` is booted.
    pub async fn resolve(&self, service: &str) -> Result<()> {
        let hook = self
            .hooks
            .read()
            .await
            .get(service)
            .cloned()
            .ok_or_else(|| LifecycleError::UnknownService(service.to_string()))?;

        hook.activate().await
    }

    pub async fn provider_for(&self, service: &str) -> Option<String> {
        self.hooks
            .read()
            .await
            .get(service)
            .map(|hook| hook.provider().to_string())
    }

    pub async fn services(&self) -> Vec<String> {
        let mut services: Vec<String> = self.hooks.read().await.keys().cloned().collect();
        services.sort();
        services
    }
}

impl Default for DeferredServices {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceLocator for DeferredServices {
    async fn defer(&self, service: &str, activation: Arc<dyn Activation>) {
        let previous = self
            .hooks
            .write()
            .await
            .insert(service.to_string(), activation);

        if let Some(previous) = previous {
            tracing::debug!(
                service,
                replaced = previous.provider(),
                "Deferred service hook replaced"
            );
        }
    }
}
