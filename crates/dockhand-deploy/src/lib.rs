//! dockhand-deploy: deployment orchestration.
//!
//! Turns a [`ServiceDefinition`](dockhand_core::ServiceDefinition) into a
//! running swarm service: build or pull the image, render the service
//! spec, make sure the proxy can reach it, apply the spec and snapshot the
//! result for rollback.
//!
//! # Components
//!
//! - **`spec`**: pure definition to `ServiceSpec` translation
//! - **`render`**: resolves networks and routing labels for `spec`
//! - **`apply`**: create-or-update with the observed version index
//! - **`rollback`**: `{app}:v{n}` snapshots and re-application
//! - **`pipeline`**: [`Deployer`], the staged deploy with failure recording

pub mod apply;
pub mod error;
pub mod pipeline;
pub mod render;
pub mod rollback;
pub mod spec;

pub use apply::{ApplyOutcome, apply};
pub use error::{DeployError, DeployResult};
pub use pipeline::Deployer;
pub use render::SpecRenderer;
pub use rollback::RollbackManager;
pub use spec::{SpecInput, build_service_spec, parse_resources};
