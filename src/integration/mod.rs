//! Seams to the collaborators that live outside the lifecycle core.
//!
//! The orchestrator never resolves services or dispatches events itself. It hands an
//! [`Activation`] to a [`ServiceLocator`] for every deferred service and to an [`EventBus`]
//! for every trigger event; the collaborator invokes it when the service is first needed
//! or the event fires.

mod events;
mod locator;

use async_trait::async_trait;

use crate::Result;

pub use events::{EventBus, LocalEventBus};
pub use locator::{DeferredServices, ServiceLocator};

/// Brings one provider to the booted state on demand.
///
/// Implementations must be safe to invoke any number of times, concurrently.
#[async_trait]
pub trait Activation: Send + Sync {
    /// Identity of the provider this activation targets.
    fn provider(&self) -> &str;

    async fn activate(&self) -> Result<()>;
}
