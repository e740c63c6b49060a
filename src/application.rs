use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::integration::{DeferredServices, LocalEventBus};
use crate::lifecycle::{
    LifecycleOrchestrator, ShutdownCallback, ShutdownCoordinator, ShutdownInfo, WorkGuard,
};
use crate::manifest::{ManifestCompiler, ManifestStore, ProviderManifest};
use crate::provider::{AppContext, Provider, ProviderRegistry};
use crate::Result;

/// Process-wide entry point wiring the registry, manifest compiler, orchestrator and
/// shutdown coordinator around an in-process service locator and event bus.
pub struct Application {
    config: Arc<AppConfig>,
    registry: Arc<ProviderRegistry>,
    compiler: Arc<ManifestCompiler>,
    orchestrator: LifecycleOrchestrator,
    shutdown: Arc<ShutdownCoordinator>,
    services: Arc<DeferredServices>,
    events: Arc<LocalEventBus>,
    context: AppContext,
}

impl Application {
    pub fn new(config: AppConfig) -> Self {
        let config = Arc::new(config);
        let services = Arc::new(DeferredServices::new());
        let events = Arc::new(LocalEventBus::new());
        let context = AppContext::new(config.clone(), services.clone(), events.clone());

        let store = config.manifest_path.clone().map(|path| ManifestStore::new(path));
        let compiler = Arc::new(ManifestCompiler::new(store));
        let registry = Arc::new(ProviderRegistry::new());
        let orchestrator =
            LifecycleOrchestrator::new(registry.clone(), compiler.clone(), context.clone());
        let shutdown = Arc::new(ShutdownCoordinator::new(registry.clone(), context.clone()));

        Self {
            config,
            registry,
            compiler,
            orchestrator,
            shutdown,
            services,
            events,
            context,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn orchestrator(&self) -> &LifecycleOrchestrator {
        &self.orchestrator
    }

    pub fn shutdown_coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Returns true if a provider with the same identity was replaced.
    pub async fn register_provider(&self, provider: Arc<dyn Provider>) -> bool {
        self.registry.register(provider).await
    }

    pub async fn register_providers(&self, providers: impl IntoIterator<Item = Arc<dyn Provider>>) {
        for provider in providers {
            self.registry.register(provider).await;
        }
    }

    pub async fn boot_all(&self) -> Result<()> {
        self.orchestrator.boot_all().await
    }

    pub async fn load_deferred_provider(&self, service: &str) -> Result<()> {
        self.orchestrator.load_deferred_provider(service).await
    }

    /// Resolves a deferred service through the locator, activating its provider if needed.
    pub async fn resolve(&self, service: &str) -> Result<()> {
        self.services.resolve(service).await
    }

    /// Fires an event on the in-process bus, returning the number of listeners run.
    pub async fn fire(&self, event: &str) -> Result<usize> {
        self.events.fire(event).await
    }

    pub async fn recompile_manifest(&self) -> Result<Arc<ProviderManifest>> {
        self.compiler.recompile(&self.registry).await
    }

    pub async fn manifest(&self) -> Option<Arc<ProviderManifest>> {
        self.compiler.current().await
    }

    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        self.shutdown.shutdown(timeout).await
    }

    pub async fn graceful_shutdown(&self) -> Result<()> {
        self.shutdown.graceful_shutdown().await
    }

    pub fn force_shutdown(&self) -> ! {
        self.shutdown.force_shutdown()
    }

    pub fn is_draining(&self) -> bool {
        self.shutdown.is_draining()
    }

    pub fn register_shutdown_callback(&self, name: &str, callback: impl ShutdownCallback + 'static) {
        self.shutdown.register_callback(name, callback);
    }

    pub fn unregister_shutdown_callback(&self, name: &str) -> bool {
        self.shutdown.unregister_callback(name)
    }

    pub fn try_begin_work(&self) -> Option<WorkGuard> {
        self.shutdown.try_begin_work()
    }

    pub fn shutdown_info(&self) -> ShutdownInfo {
        self.shutdown.info()
    }
}
