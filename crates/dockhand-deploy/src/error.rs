//! Deployment error types.

use dockhand_build::BuildError;
use dockhand_core::ValidationError;
use dockhand_exec::ExecError;
use dockhand_proxy::ProxyError;
use dockhand_state::StateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("network {network} is in use: {reason}")]
    NetworkInUse { network: String, reason: String },

    #[error(transparent)]
    Proxy(ProxyError),

    #[error("rollback version {version} of {app} not found")]
    RollbackNotFound { app: String, version: u32 },
}

impl From<ProxyError> for DeployError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::NetworkInUse { network, reason } => Self::NetworkInUse { network, reason },
            ProxyError::Validation(e) => Self::Validation(e),
            ProxyError::State(e) => Self::State(e),
            ProxyError::Exec(e) => Self::Exec(e),
            other => Self::Proxy(other),
        }
    }
}

impl DeployError {
    /// Stale version index on update.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Exec(ExecError::Conflict(_)))
    }
}

pub type DeployResult<T> = Result<T, DeployError>;
