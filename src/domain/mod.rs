//! Usage: Pure domain model (credential records, resolution, rotation, canonical snapshots).

pub mod account_rotation;
pub mod credential_registry;
pub mod credentials;
pub mod quota;
pub mod snapshot;
