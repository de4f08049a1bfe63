//! Usage: Process-level wiring (CLI surface, logging).

pub mod cli;
pub mod logging;
