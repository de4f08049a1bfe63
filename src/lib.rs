//! Multi-provider credential resolution and usage aggregation.
//!
//! Layers, bottom-up:
//! - `shared`: error model, blocking bridge, time and masking helpers;
//! - `domain`: credential records, resolution, rotation and canonical snapshots (pure);
//! - `infra`: filesystem paths, settings and the credential store;
//! - `oauth`: device authorization and token refresh;
//! - `providers`: the `UsageProvider` seam and one integration per upstream;
//! - `usage`: the collection, login and rotation workflows.

pub mod app;
pub mod domain;
pub mod infra;
pub mod oauth;
pub mod providers;
pub mod shared;
pub mod usage;

pub use domain::snapshot::UsageSnapshot;
pub use shared::error::{AppError, AppResult, UsageError};
