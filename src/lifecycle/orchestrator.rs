use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::ActivationGates;
use crate::integration::Activation;
use crate::manifest::{ManifestCompiler, ProviderManifest};
use crate::provider::{AppContext, ProviderRecord, ProviderRegistry};
use crate::{LifecycleError, Result};

/// Drives eager register→boot at startup and on-demand load→boot for deferred and
/// event-triggered providers.
#[derive(Clone)]
pub struct LifecycleOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<ProviderRegistry>,
    compiler: Arc<ManifestCompiler>,
    app: AppContext,
    gates: ActivationGates,
    /// Hook key to the provider it currently targets in the locator or event bus.
    installed: Mutex<HashMap<String, String>>,
}

impl LifecycleOrchestrator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        compiler: Arc<ManifestCompiler>,
        app: AppContext,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                compiler,
                app,
                gates: ActivationGates::new(),
                installed: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.inner.registry
    }

    /// Startup sequence: compile the manifest, register every eager provider in priority
    /// order, boot them in the same order, then install deferred and event hooks.
    ///
    /// Fails fast on the first register or boot error. Providers booted before the
    /// failure stay booted. Safe to call again; completed steps are skipped.
    pub async fn boot_all(&self) -> Result<()> {
        let manifest = self.inner.compiler.compile(&self.inner.registry).await?;
        let eager = self.eager_records(&manifest).await?;

        info!(count = eager.len(), "Loading eager providers");
        for record in &eager {
            self.load(record).await?;
        }

        for record in &eager {
            self.boot(record).await?;
        }
        info!(count = eager.len(), "Eager providers booted");

        self.install_deferred_hooks(&manifest).await;
        self.install_event_hooks(&manifest).await;
        Ok(())
    }

    /// Loads and boots the provider behind a deferred service.
    pub async fn load_deferred_provider(&self, service: &str) -> Result<()> {
        let manifest = self.inner.compiler.compile(&self.inner.registry).await?;
        let provider = manifest
            .provider_for(service)
            .ok_or_else(|| LifecycleError::UnknownService(service.to_string()))?
            .to_string();

        self.activate(&provider, &format!("service:{}", service)).await
    }

    /// Brings `id` to the booted state exactly once, however many callers race here.
    ///
    /// Concurrent callers wait for the first one and observe its outcome. A provider that
    /// failed is terminal: later calls return [`LifecycleError::ProviderFailed`] without
    /// running any hook, and no Loaded/Booted mark is kept for it.
    pub async fn activate(&self, id: &str, trigger: &str) -> Result<()> {
        let registry = &self.inner.registry;
        if registry.is_booted(id).await {
            return Ok(());
        }

        let record = registry
            .get(id)
            .await
            .ok_or_else(|| LifecycleError::UnknownProvider(id.to_string()))?;

        let _gate = self.inner.gates.acquire(id).await;

        if registry.is_failed(id).await {
            return Err(LifecycleError::ProviderFailed(id.to_string()));
        }
        if registry.is_booted(id).await {
            debug!(provider = %id, trigger, "Provider already booted by a concurrent activation");
            return Ok(());
        }

        let needs_register = !registry.is_loaded(id).await;
        if needs_register {
            if let Err(e) = record.provider().register(&self.inner.app).await {
                return Err(self.fail(id, LifecycleError::register(id, &e)).await);
            }
        }

        if let Err(e) = record.provider().boot(&self.inner.app).await {
            return Err(self.fail(id, LifecycleError::boot(id, &e)).await);
        }

        if needs_register {
            registry.mark_loaded(id).await?;
        }
        registry.mark_booted(id).await?;

        info!(provider = %id, trigger, "Provider loaded and booted on demand");
        Ok(())
    }

    async fn eager_records(&self, manifest: &ProviderManifest) -> Result<Vec<ProviderRecord>> {
        let eager: HashSet<&str> = manifest.eager.iter().map(String::as_str).collect();
        let records: Vec<ProviderRecord> = self
            .inner
            .registry
            .ordered()
            .await
            .into_iter()
            .filter(|r| eager.contains(r.id.as_str()))
            .collect();

        if records.len() != eager.len() {
            let known: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
            if let Some(missing) = eager.iter().find(|id| !known.contains(*id)) {
                return Err(LifecycleError::UnknownProvider(missing.to_string()));
            }
        }

        Ok(records)
    }

    async fn load(&self, record: &ProviderRecord) -> Result<()> {
        let id = record.id.as_str();
        let registry = &self.inner.registry;
        let _gate = self.inner.gates.acquire(id).await;

        if registry.is_failed(id).await {
            return Err(LifecycleError::ProviderFailed(id.to_string()));
        }
        if registry.is_loaded(id).await {
            return Ok(());
        }

        debug!(provider = %id, priority = record.priority, "Registering eager provider");
        if let Err(e) = record.provider().register(&self.inner.app).await {
            return Err(self.fail(id, LifecycleError::register(id, &e)).await);
        }
        registry.mark_loaded(id).await?;
        Ok(())
    }

    async fn boot(&self, record: &ProviderRecord) -> Result<()> {
        let id = record.id.as_str();
        let registry = &self.inner.registry;
        let _gate = self.inner.gates.acquire(id).await;

        if registry.is_failed(id).await {
            return Err(LifecycleError::ProviderFailed(id.to_string()));
        }
        if registry.is_booted(id).await {
            return Ok(());
        }

        debug!(provider = %id, priority = record.priority, "Booting eager provider");
        if let Err(e) = record.provider().boot(&self.inner.app).await {
            return Err(self.fail(id, LifecycleError::boot(id, &e)).await);
        }
        registry.mark_booted(id).await?;
        Ok(())
    }

    async fn fail(&self, id: &str, err: LifecycleError) -> LifecycleError {
        error!(provider = %id, "{}", err);
        if let Err(e) = self.inner.registry.mark_failed(id).await {
            error!(provider = %id, "Could not record provider failure: {}", e);
        }
        err
    }

    async fn install_deferred_hooks(&self, manifest: &ProviderManifest) {
        let mut installed = 0;
        for (service, provider) in &manifest.deferred {
            // a service taken over by a later registration gets its hook replaced
            if !self.claim_hook(format!("service:{}", service), provider).await {
                continue;
            }
            debug!(service = %service, provider = %provider, "Deferring service");
            let activation = self.activation(provider, format!("service:{}", service));
            self.inner.app.services().defer(service, activation).await;
            installed += 1;
        }
        if installed > 0 {
            info!(count = installed, "Deferred service hooks installed");
        }
    }

    async fn install_event_hooks(&self, manifest: &ProviderManifest) {
        let mut installed = 0;
        for (provider, events) in &manifest.when {
            for event in events {
                if !self.claim_hook(format!("event:{}:{}", event, provider), provider).await {
                    continue;
                }
                debug!(event = %event, provider = %provider, "Listening for trigger event");
                let activation = self.activation(provider, format!("event:{}", event));
                self.inner.app.events().listen(event, activation).await;
                installed += 1;
            }
        }
        if installed > 0 {
            info!(count = installed, "Event trigger hooks installed");
        }
    }

    /// Returns true if `key` is not yet installed for `provider`.
    async fn claim_hook(&self, key: String, provider: &str) -> bool {
        let mut installed = self.inner.installed.lock().await;
        if installed.get(&key).map(String::as_str) == Some(provider) {
            return false;
        }
        installed.insert(key, provider.to_string());
        true
    }

    fn activation(&self, provider: &str, trigger: String) -> Arc<dyn Activation> {
        Arc::new(ProviderActivation {
            orchestrator: Arc::downgrade(&self.inner),
            provider: provider.to_string(),
            trigger,
        })
    }
}

/// Hook handed to the locator or event bus. Holds the orchestrator weakly so the
/// collaborators do not keep it alive.
struct ProviderActivation {
    orchestrator: Weak<Inner>,
    provider: String,
    trigger: String,
}

#[async_trait]
impl Activation for ProviderActivation {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn activate(&self) -> Result<()> {
        let inner = self
            .orchestrator
            .upgrade()
            .ok_or_else(|| LifecycleError::InvalidTransition {
                provider: self.provider.clone(),
                reason: "lifecycle orchestrator has been dropped".to_string(),
            })?;

        LifecycleOrchestrator { inner }
            .activate(&self.provider, &self.trigger)
            .await
    }
}
