use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

use super::Provider;
use crate::{LifecycleError, Result};

/// Identity and declared metadata of one provider, captured when it is registered.
#[derive(Clone)]
pub struct ProviderRecord {
    pub id: String,
    pub priority: i32,
    pub deferred: bool,
    pub provides: Vec<String>,
    pub when: Vec<String>,
    pub terminable: bool,
    seq: u64,
    provider: Arc<dyn Provider>,
}

impl ProviderRecord {
    fn capture(provider: Arc<dyn Provider>, seq: u64) -> Self {
        Self {
            id: provider.identity().to_string(),
            priority: provider.priority(),
            deferred: provider.is_deferred(),
            provides: provider.provides(),
            when: provider.when(),
            terminable: provider.terminable(),
            seq,
            provider,
        }
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Registration position, used as the priority tie-break.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl std::fmt::Debug for ProviderRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRecord")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("deferred", &self.deferred)
            .field("provides", &self.provides)
            .field("when", &self.when)
            .field("terminable", &self.terminable)
            .field("seq", &self.seq)
            .finish()
    }
}

#[derive(Default)]
struct Registered {
    by_id: HashMap<String, ProviderRecord>,
    next_seq: u64,
}

/// Single source of truth for provider state.
///
/// Marks are monotonic and enforce `booted ⊆ loaded ⊆ registered`. Locks are never held
/// while a provider hook runs.
pub struct ProviderRegistry {
    registered: RwLock<Registered>,
    loaded: RwLock<HashSet<String>>,
    booted: RwLock<HashSet<String>>,
    failed: RwLock<HashSet<String>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            registered: RwLock::new(Registered::default()),
            loaded: RwLock::new(HashSet::new()),
            booted: RwLock::new(HashSet::new()),
            failed: RwLock::new(HashSet::new()),
        }
    }

    /// Adds `provider`, replacing any earlier registration with the same identity.
    ///
    /// A replacement keeps the original registration position and any load/boot marks
    /// already recorded for the identity. Returns true when something was replaced.
    pub async fn register(&self, provider: Arc<dyn Provider>) -> bool {
        let mut registered = self.registered.write().await;
        let id = provider.identity().to_string();

        // A re-registered identity keeps its slot, so it does not become the latest
        // registration when deferred providers collide on a service name.
        let seq = match registered.by_id.get(&id) {
            Some(existing) => existing.seq,
            None => {
                let seq = registered.next_seq;
                registered.next_seq += 1;
                seq
            }
        };

        let record = ProviderRecord::capture(provider, seq);
        tracing::debug!(
            provider = %record.id,
            priority = record.priority,
            deferred = record.deferred,
            terminable = record.terminable,
            "Registering provider"
        );

        let replaced = registered.by_id.insert(id.clone(), record).is_some();
        if replaced {
            tracing::warn!(provider = %id, "Provider re-registered, previous registration replaced");
        }
        replaced
    }

    pub async fn get(&self, id: &str) -> Option<ProviderRecord> {
        self.registered.read().await.by_id.get(id).cloned()
    }

    /// All records in registration order.
    pub async fn records(&self) -> Vec<ProviderRecord> {
        let mut records: Vec<ProviderRecord> =
            self.registered.read().await.by_id.values().cloned().collect();
        records.sort_by_key(|r| r.seq);
        records
    }

    /// All records by ascending priority, ties in registration order.
    pub async fn ordered(&self) -> Vec<ProviderRecord> {
        let mut records = self.records().await;
        // stable: equal priorities keep registration order
        records.sort_by_key(|r| r.priority);
        records
    }

    /// Terminable records by descending priority; the exact reverse of [`ordered`](Self::ordered).
    pub async fn terminable(&self) -> Vec<ProviderRecord> {
        self.ordered()
            .await
            .into_iter()
            .rev()
            .filter(|r| r.terminable)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.registered.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn is_registered(&self, id: &str) -> bool {
        self.registered.read().await.by_id.contains_key(id)
    }

    /// Returns true if the provider was not already loaded.
    pub async fn mark_loaded(&self, id: &str) -> Result<bool> {
        if !self.is_registered(id).await {
            return Err(LifecycleError::UnknownProvider(id.to_string()));
        }
        Ok(self.loaded.write().await.insert(id.to_string()))
    }

    /// Returns true if the provider was not already booted.
    pub async fn mark_booted(&self, id: &str) -> Result<bool> {
        if !self.is_loaded(id).await {
            return Err(LifecycleError::InvalidTransition {
                provider: id.to_string(),
                reason: "cannot boot a provider that is not loaded".to_string(),
            });
        }
        Ok(self.booted.write().await.insert(id.to_string()))
    }

    pub async fn mark_failed(&self, id: &str) -> Result<()> {
        if !self.is_registered(id).await {
            return Err(LifecycleError::UnknownProvider(id.to_string()));
        }
        self.failed.write().await.insert(id.to_string());
        Ok(())
    }

    pub async fn is_loaded(&self, id: &str) -> bool {
        self.loaded.read().await.contains(id)
    }

    pub async fn is_booted(&self, id: &str) -> bool {
        self.booted.read().await.contains(id)
    }

    pub async fn is_failed(&self, id: &str) -> bool {
        self.failed.read().await.contains(id)
    }

    pub async fn loaded(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.loaded.read().await.iter().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn booted(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.booted.read().await.iter().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
