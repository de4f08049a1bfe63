//! Usage: Aggregation workflows (usage collection, provider filter, Copilot login, account rotation).

pub mod collect;
pub mod filter;
pub mod login;
pub mod rotation;

pub use collect::{CollectOptions, UsageCollector};
pub use filter::resolve_provider_filter;
