//! Order-independent fingerprint of a provider set.
//!
//! Covers identity, priority and every capability flag, so re-registering an identity
//! with different metadata invalidates a cached manifest.

use crate::provider::ProviderRecord;

pub fn fingerprint(records: &[ProviderRecord]) -> String {
    let mut lines: Vec<String> = records.iter().map(canonical).collect();
    lines.sort();

    let mut hasher = blake3::Hasher::new();
    for line in &lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

fn canonical(record: &ProviderRecord) -> String {
    format!(
        "{}|{}|{}|{}|{}|{}",
        record.id,
        record.priority,
        record.deferred,
        record.terminable,
        record.provides.join(","),
        record.when.join(","),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderRegistry;
    use crate::test_utils::TestProvider;
    use std::sync::Arc;

    async fn records(providers: Vec<TestProvider>) -> Vec<ProviderRecord> {
        let registry = ProviderRegistry::new();
        for p in providers {
            registry.register(Arc::new(p)).await;
        }
        registry.records().await
    }

    #[tokio::test]
    async fn test_registration_order_is_irrelevant() {
        let a = records(vec![TestProvider::new("a"), TestProvider::new("b")]).await;
        let b = records(vec![TestProvider::new("b"), TestProvider::new("a")]).await;
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[tokio::test]
    async fn test_metadata_changes_fingerprint() {
        let base = records(vec![TestProvider::new("a").priority(10)]).await;
        let reprioritized = records(vec![TestProvider::new("a").priority(20)]).await;
        let deferred = records(vec![TestProvider::new("a").priority(10).deferred(&["svc"])]).await;

        assert_ne!(fingerprint(&base), fingerprint(&reprioritized));
        assert_ne!(fingerprint(&base), fingerprint(&deferred));
    }

    #[tokio::test]
    async fn test_empty_set_is_stable() {
        assert_eq!(fingerprint(&[]), fingerprint(&[]));
    }
}
