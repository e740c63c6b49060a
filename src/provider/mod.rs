mod context;
mod registry;
mod traits;

pub use context::AppContext;
pub use registry::{ProviderRecord, ProviderRegistry};
pub use traits::Provider;
