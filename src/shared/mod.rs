//! Usage: Cross-cutting helpers shared by every layer.

pub mod blocking;
pub mod error;
pub mod security;
pub mod time;
