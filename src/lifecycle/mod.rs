//! Provider activation and coordinated shutdown.
//!
//! [`LifecycleOrchestrator`] moves providers through register and boot, eagerly at
//! startup or on first use. [`ShutdownCoordinator`] runs the reverse path once:
//! shutdown callbacks, drain, then provider termination in descending priority.

mod drain;
mod gates;
mod orchestrator;
mod shutdown;
pub mod signals;

use gates::ActivationGates;

pub use drain::{DrainTracker, WorkGuard};
pub use orchestrator::LifecycleOrchestrator;
pub use shutdown::{ShutdownCallback, ShutdownCoordinator, ShutdownInfo, ShutdownPhase};
