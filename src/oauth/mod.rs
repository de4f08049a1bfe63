//! Usage: OAuth flows used by usage integrations (device authorization, token refresh).

pub mod device_flow;
pub mod refresh;
pub(crate) mod token_exchange;

pub use token_exchange::TokenEndpoint;
