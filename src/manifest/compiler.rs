use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use super::fingerprint::fingerprint;
use super::{ManifestStore, ProviderManifest};
use crate::provider::{ProviderRecord, ProviderRegistry};
use crate::Result;

/// Classifies providers and caches the result by provider-set fingerprint.
pub struct ManifestCompiler {
    cached: RwLock<Option<Arc<ProviderManifest>>>,
    store: Option<ManifestStore>,
    compilations: AtomicU64,
}

impl ManifestCompiler {
    pub fn new(store: Option<ManifestStore>) -> Self {
        Self {
            cached: RwLock::new(None),
            store,
            compilations: AtomicU64::new(0),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(None)
    }

    /// Returns the cached manifest if it still matches the registry, compiling otherwise.
    pub async fn compile(&self, registry: &ProviderRegistry) -> Result<Arc<ProviderManifest>> {
        let records = registry.records().await;
        let current = fingerprint(&records);

        if let Some(cached) = self.cached.read().await.as_ref() {
            if cached.fingerprint == current {
                tracing::debug!(fingerprint = %current, "Using cached provider manifest");
                return Ok(cached.clone());
            }
        }

        if let Some(persisted) = self.load_persisted(&records, &current).await {
            tracing::debug!(fingerprint = %current, "Using persisted provider manifest");
            let persisted = Arc::new(persisted);
            *self.cached.write().await = Some(persisted.clone());
            return Ok(persisted);
        }

        self.compile_records(&records, current).await
    }

    /// Compiles unconditionally, replacing any cached manifest.
    pub async fn recompile(&self, registry: &ProviderRegistry) -> Result<Arc<ProviderManifest>> {
        let records = registry.records().await;
        let current = fingerprint(&records);
        self.compile_records(&records, current).await
    }

    pub async fn current(&self) -> Option<Arc<ProviderManifest>> {
        self.cached.read().await.clone()
    }

    /// Number of times a manifest was actually compiled (cache misses).
    pub fn compilations(&self) -> u64 {
        self.compilations.load(Ordering::Relaxed)
    }

    /// Pure classification. `records` must be in registration order so that the last
    /// registration wins a service-name collision.
    ///
    /// Deferred (with at least one service) takes precedence over event-triggered,
    /// which takes precedence over eager.
    pub fn classify(records: &[ProviderRecord], fingerprint: String) -> ProviderManifest {
        let mut eager = Vec::new();
        let mut deferred = BTreeMap::new();
        let mut when = BTreeMap::new();

        for record in records {
            if record.deferred && !record.provides.is_empty() {
                for service in &record.provides {
                    if let Some(previous) = deferred.insert(service.clone(), record.id.clone()) {
                        if previous != record.id {
                            tracing::warn!(
                                service = %service,
                                previous = %previous,
                                provider = %record.id,
                                "Deferred service claimed by a later provider"
                            );
                        }
                    }
                }
            } else if !record.when.is_empty() {
                when.insert(record.id.clone(), record.when.clone());
            } else {
                eager.push(record.id.clone());
            }
        }

        ProviderManifest {
            fingerprint,
            compiled_at: Utc::now(),
            providers: records.iter().map(|r| r.id.clone()).collect(),
            eager,
            deferred,
            when,
        }
    }

    async fn compile_records(
        &self,
        records: &[ProviderRecord],
        fingerprint: String,
    ) -> Result<Arc<ProviderManifest>> {
        tracing::debug!(fingerprint = %fingerprint, providers = records.len(), "Compiling provider manifest");

        let manifest = Arc::new(Self::classify(records, fingerprint));
        self.compilations.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            eager = manifest.eager.len(),
            deferred = manifest.deferred.len(),
            event_triggered = manifest.when.len(),
            "Provider manifest compiled"
        );

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&manifest).await {
                tracing::warn!(path = %store.path().display(), "Failed to persist provider manifest: {}", e);
            }
        }

        *self.cached.write().await = Some(manifest.clone());
        Ok(manifest)
    }

    async fn load_persisted(
        &self,
        records: &[ProviderRecord],
        current: &str,
    ) -> Option<ProviderManifest> {
        let store = self.store.as_ref()?;

        let manifest = match store.load().await {
            Ok(Some(manifest)) => manifest,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(path = %store.path().display(), "Ignoring unreadable provider manifest: {}", e);
                return None;
            }
        };

        if manifest.fingerprint != current {
            tracing::debug!("Persisted provider manifest is stale");
            return None;
        }

        let registered: HashSet<String> = records.iter().map(|r| r.id.clone()).collect();
        if let Err(e) = manifest.validate(&registered) {
            tracing::warn!("Persisted provider manifest is invalid: {}", e);
            return None;
        }

        Some(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestProvider;
    use tempfile::tempdir;

    async fn registry_with(providers: Vec<TestProvider>) -> ProviderRegistry {
        let registry = ProviderRegistry::new();
        for p in providers {
            registry.register(Arc::new(p)).await;
        }
        registry
    }

    #[tokio::test]
    async fn test_classification_rules() {
        let registry = registry_with(vec![
            TestProvider::new("log"),
            TestProvider::new("mail").deferred(&["mailer", "mail.transport"]),
            TestProvider::new("audit").when(&["user.login"]),
            // deferred wins over event triggers
            TestProvider::new("queue").deferred(&["queue"]).when(&["job.pushed"]),
            // deferred without services falls through to event-triggered
            TestProvider::new("search").deferred(&[]).when(&["index.requested"]),
        ])
        .await;

        let manifest = ManifestCompiler::in_memory().compile(&registry).await.unwrap();

        assert_eq!(manifest.eager, vec!["log".to_string()]);
        assert_eq!(manifest.provider_for("mailer"), Some("mail"));
        assert_eq!(manifest.provider_for("mail.transport"), Some("mail"));
        assert_eq!(manifest.provider_for("queue"), Some("queue"));
        assert!(!manifest.when.contains_key("queue"));
        assert_eq!(manifest.when["audit"], vec!["user.login".to_string()]);
        assert_eq!(manifest.when["search"], vec!["index.requested".to_string()]);
        assert_eq!(manifest.providers.len(), 5);
    }

    #[tokio::test]
    async fn test_last_registration_wins_service_collision() {
        let registry = registry_with(vec![
            TestProvider::new("smtp").priority(1).deferred(&["mailer"]),
            TestProvider::new("ses").priority(500).deferred(&["mailer"]),
        ])
        .await;

        let manifest = ManifestCompiler::in_memory().compile(&registry).await.unwrap();
        assert_eq!(manifest.provider_for("mailer"), Some("ses"));
    }

    #[tokio::test]
    async fn test_reregistration_keeps_collision_winner() {
        let registry = registry_with(vec![
            TestProvider::new("smtp").deferred(&["mailer"]),
            TestProvider::new("ses").deferred(&["mailer"]),
        ])
        .await;
        registry
            .register(Arc::new(TestProvider::new("smtp").deferred(&["mailer"]).terminable()))
            .await;

        let manifest = ManifestCompiler::in_memory().compile(&registry).await.unwrap();
        assert_eq!(manifest.provider_for("mailer"), Some("ses"));
        assert_eq!(manifest.providers, vec!["smtp".to_string(), "ses".to_string()]);
    }

    #[tokio::test]
    async fn test_cache_hit_and_invalidation() {
        let registry = registry_with(vec![TestProvider::new("log")]).await;
        let compiler = ManifestCompiler::in_memory();

        let first = compiler.compile(&registry).await.unwrap();
        let second = compiler.compile(&registry).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(compiler.compilations(), 1);

        // same identity, changed metadata
        registry
            .register(Arc::new(TestProvider::new("log").deferred(&["logger"])))
            .await;
        let third = compiler.compile(&registry).await.unwrap();
        assert_eq!(compiler.compilations(), 2);
        assert!(third.eager.is_empty());

        compiler.recompile(&registry).await.unwrap();
        assert_eq!(compiler.compilations(), 3);
    }

    #[tokio::test]
    async fn test_persisted_manifest_is_reused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("providers.json");
        let registry = registry_with(vec![
            TestProvider::new("log"),
            TestProvider::new("mail").deferred(&["mailer"]),
        ])
        .await;

        let writer = ManifestCompiler::new(Some(ManifestStore::new(&path)));
        let written = writer.compile(&registry).await.unwrap();
        assert_eq!(writer.compilations(), 1);

        let reader = ManifestCompiler::new(Some(ManifestStore::new(&path)));
        let read = reader.compile(&registry).await.unwrap();
        assert_eq!(reader.compilations(), 0);
        assert_eq!(*read, *written);
    }

    #[tokio::test]
    async fn test_stale_persisted_manifest_is_recompiled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("providers.json");

        let old = registry_with(vec![TestProvider::new("log")]).await;
        ManifestCompiler::new(Some(ManifestStore::new(&path)))
            .compile(&old)
            .await
            .unwrap();

        let new = registry_with(vec![TestProvider::new("log"), TestProvider::new("http")]).await;
        let compiler = ManifestCompiler::new(Some(ManifestStore::new(&path)));
        let manifest = compiler.compile(&new).await.unwrap();

        assert_eq!(compiler.compilations(), 1);
        assert_eq!(manifest.eager, vec!["log".to_string(), "http".to_string()]);
    }

    #[tokio::test]
    async fn test_unwritable_store_does_not_fail_compilation() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();
        // parent is a regular file, so create_dir_all fails
        let store = ManifestStore::new(blocker.join("providers.json"));

        let registry = registry_with(vec![TestProvider::new("log")]).await;
        let manifest = ManifestCompiler::new(Some(store)).compile(&registry).await.unwrap();
        assert_eq!(manifest.eager, vec!["log".to_string()]);
    }
}
