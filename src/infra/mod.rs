//! Usage: Filesystem-facing infrastructure (paths, settings, credential store).

pub mod auth_paths;
pub mod credential_store;
pub mod settings;
