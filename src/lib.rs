pub mod application;
pub mod config;
pub mod integration;
pub mod lifecycle;
pub mod manifest;
pub mod provider;
pub mod types;

#[cfg(test)]
pub mod test_utils;

pub use application::Application;
pub use config::AppConfig;
pub use provider::{AppContext, Provider};
pub use types::error::{LifecycleError, Result};
pub use types::PriorityTier;
