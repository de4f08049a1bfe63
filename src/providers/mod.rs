//! Usage: Usage provider seam (trait, registry) and the builtin integrations.

pub mod adapters;
pub mod provider_trait;
pub mod registry;

pub use provider_trait::{FetchContext, UsageProvider};
pub use registry::{global_registry, ProviderRegistry};
