//! Validation error types.
//!
//! Validation runs before any mutation, so a `ValidationError` always
//! means nothing was changed on the target host.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("duplicate domain config key `{key}` on {app}")]
    DuplicateConfigKey { app: String, key: String },

    #[error("domain {host}: strip_path requires a non-root path")]
    StripPathOnRoot { host: String },

    #[error("domain {host}: internal path `{path}` must start with `/`")]
    InvalidInternalPath { host: String, path: String },

    #[error("invalid {field} value `{value}`: expected an integer")]
    InvalidResource { field: &'static str, value: String },

    #[error("network {network} uses the {driver} driver, which {workload} cannot join")]
    IncompatibleDriver {
        network: String,
        driver: String,
        workload: String,
    },

    #[error("environment references unknown project variable `{0}`")]
    UnknownProjectVariable(String),

    #[error("domain {host} routes over network {network}, which {app} does not join")]
    DomainNetworkNotJoined {
        app: String,
        host: String,
        network: String,
    },

    #[error("unknown network id: {0}")]
    UnknownNetwork(String),

    #[error("unknown server id: {0}")]
    UnknownServer(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type ValidationResult<T> = Result<T, ValidationError>;
