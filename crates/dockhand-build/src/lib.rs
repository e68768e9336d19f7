//! dockhand-build: build strategy dispatcher.
//!
//! Pipeline:
//! 1. [`plan`] composes the shell steps of the selected strategy
//!    (dockerfile, heroku/paketo buildpacks, nixpacks, static, railpack)
//! 2. [`Builder::run`] executes them through the gateway shell
//! 3. every strategy builds into `{app}:dockhand-build`; only a fully
//!    successful build is promoted to `{app}:latest`
//!
//! Image sources skip planning: the image is pulled (with registry
//! credentials if configured) and deployed as-is.

mod buildpacks;
mod dockerfile;
pub mod error;
mod nixpacks;
pub mod plan;
mod railpack;
pub mod runner;
mod static_site;

pub use error::{BuildError, BuildResult};
pub use plan::{BuildPlan, BuildRequest, BuildStep, plan};
pub use runner::{BuildJob, BuildStatus, Builder, JobSource};
