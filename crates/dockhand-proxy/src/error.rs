//! Proxy and network error types.

use dockhand_core::ValidationError;
use dockhand_exec::ExecError;
use dockhand_state::StateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("network {network} is in use: {reason}")]
    NetworkInUse { network: String, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Neither a proxy service nor a proxy container exists on the target.
    #[error("reverse proxy `{0}` not found on target")]
    ProxyNotFound(String),

    #[error("invalid dynamic config: {0}")]
    DynamicConfig(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

pub type ProxyResult<T> = Result<T, ProxyError>;
