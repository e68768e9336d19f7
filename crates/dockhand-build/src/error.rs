//! Build error types.

use dockhand_core::ValidationError;
use dockhand_exec::ExecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    /// A build step exited non-zero. Nothing was tagged `latest`.
    #[error("build step `{step}` failed with status {code}: {detail}")]
    Failed {
        step: String,
        code: i32,
        detail: String,
    },

    #[error("invalid build request: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

pub type BuildResult<T> = Result<T, BuildError>;
