use std::sync::Arc;

use crate::config::AppConfig;
use crate::integration::{EventBus, ServiceLocator};

/// Application handle passed to every provider hook.
#[derive(Clone)]
pub struct AppContext {
    config: Arc<AppConfig>,
    services: Arc<dyn ServiceLocator>,
    events: Arc<dyn EventBus>,
}

impl AppContext {
    pub fn new(
        config: Arc<AppConfig>,
        services: Arc<dyn ServiceLocator>,
        events: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            config,
            services,
            events,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn services(&self) -> &Arc<dyn ServiceLocator> {
        &self.services
    }

    pub fn events(&self) -> &Arc<dyn EventBus> {
        &self.events
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
