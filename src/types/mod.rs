pub mod error;
pub mod priority;

pub use error::{LifecycleError, Result};
pub use priority::PriorityTier;
