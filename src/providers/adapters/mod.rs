//! Usage: Concrete usage integrations, one per upstream provider.

pub mod anthropic;
pub mod codex;
pub mod copilot;
pub mod openrouter;
pub mod proxy;
pub mod zai;
