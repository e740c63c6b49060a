mod compiler;
pub mod fingerprint;
mod store;

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{LifecycleError, Result};

pub use compiler::ManifestCompiler;
pub use store::ManifestStore;

/// Classification of the registered providers into eager, deferred and event-triggered groups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderManifest {
    pub fingerprint: String,

    #[serde(default = "Utc::now")]
    pub compiled_at: DateTime<Utc>,

    /// Every identity the manifest was compiled from, in registration order.
    pub providers: Vec<String>,

    pub eager: Vec<String>,

    /// Service name to the identity of the provider that satisfies it.
    #[serde(default)]
    pub deferred: BTreeMap<String, String>,

    /// Identity to the events that load it.
    #[serde(default)]
    pub when: BTreeMap<String, Vec<String>>,
}

impl ProviderManifest {
    pub fn provider_for(&self, service: &str) -> Option<&str> {
        self.deferred.get(service).map(String::as_str)
    }

    /// Checks that every identity the manifest refers to is in `registered`.
    pub fn validate(&self, registered: &HashSet<String>) -> Result<()> {
        for (service, provider) in &self.deferred {
            if provider.is_empty() {
                return Err(LifecycleError::Manifest(format!(
                    "service '{}' has an empty provider identity",
                    service
                )));
            }
        }

        let referenced = self
            .eager
            .iter()
            .chain(self.deferred.values())
            .chain(self.when.keys());

        for provider in referenced {
            if !registered.contains(provider) {
                return Err(LifecycleError::Manifest(format!(
                    "provider '{}' is not registered",
                    provider
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> ProviderManifest {
        ProviderManifest {
            fingerprint: "abc".into(),
            compiled_at: Utc::now(),
            providers: vec!["log".into(), "mail".into(), "audit".into()],
            eager: vec!["log".into()],
            deferred: BTreeMap::from([("mailer".into(), "mail".into())]),
            when: BTreeMap::from([("audit".into(), vec!["user.login".into()])]),
        }
    }

    fn registered(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_validate_accepts_registered_set() {
        assert!(manifest().validate(&registered(&["log", "mail", "audit"])).is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_identity() {
        let err = manifest()
            .validate(&registered(&["log", "mail"]))
            .unwrap_err();
        assert!(err.to_string().contains("audit"));
    }

    #[test]
    fn test_validate_rejects_empty_deferred_identity() {
        let mut m = manifest();
        m.deferred.insert("cache".into(), String::new());
        assert!(m.validate(&registered(&["log", "mail", "audit"])).is_err());
    }

    #[test]
    fn test_provider_for() {
        let m = manifest();
        assert_eq!(m.provider_for("mailer"), Some("mail"));
        assert_eq!(m.provider_for("cache"), None);
    }
}
