use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-identity single-flight gates.
///
/// Holding a provider's gate serializes its load/boot sequence without touching the
/// registry locks, so activations of unrelated providers never wait on each other.
#[derive(Default)]
pub struct ActivationGates {
    gates: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ActivationGates {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: &str) -> OwnedMutexGuard<()> {
        let gate = self
            .gates
            .lock()
            .await
            .entry(id.to_string())
            .or_default()
            .clone();
        gate.lock_owned().await
    }
}
