//! dockhand-core: shared model for the dockhand deployment engine.
//!
//! # Components
//!
//! - **`types`**: service definitions, domains, networks and the records
//!   the engine writes (deployments, rollbacks)
//! - **`config`**: `dockhand.toml` parsing with defaults for every field
//! - **`validate`**: checks that run before any mutation
//! - **`env`**: `${{project.KEY}}` interpolation
//! - **`paths`**: on-disk layout shared by local and remote hosts

pub mod config;
pub mod env;
pub mod error;
pub mod paths;
pub mod types;
pub mod validate;

pub use config::{EngineConfig, ProxyConfig, RoutingProvider, ServerConfig};
pub use error::{ValidationError, ValidationResult};
pub use paths::AppPaths;
pub use types::*;

/// Seconds since the Unix epoch.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
