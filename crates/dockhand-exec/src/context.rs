//! Execution targets.

use std::fmt;
use std::path::PathBuf;

use dockhand_core::{EngineConfig, ValidationError, ValidationResult};

/// Where a command or engine call runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionContext {
    Local,
    Remote(RemoteHost),
}

/// An SSH-reachable server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHost {
    pub server_id: String,
    pub address: String,
    pub port: u16,
    pub user: String,
    pub identity_file: Option<PathBuf>,
}

impl RemoteHost {
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.address)
    }

    /// Common `ssh` options. Batch mode fails fast instead of prompting.
    pub fn ssh_args(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-p".to_string(),
            self.port.to_string(),
        ];
        if let Some(key) = &self.identity_file {
            args.push("-i".to_string());
            args.push(key.to_string_lossy().into_owned());
        }
        args
    }
}

impl ExecutionContext {
    /// Build the context for an optional server id. `None` is the local host.
    pub fn resolve(config: &EngineConfig, server_id: Option<&str>) -> ValidationResult<Self> {
        let Some(id) = server_id else {
            return Ok(Self::Local);
        };
        let server = config
            .server(id)
            .ok_or_else(|| ValidationError::UnknownServer(id.to_string()))?;
        Ok(Self::Remote(RemoteHost {
            server_id: id.to_string(),
            address: server.address.clone(),
            port: server.port,
            user: server.user.clone(),
            identity_file: server.identity_file.clone(),
        }))
    }

    pub fn server_id(&self) -> Option<&str> {
        match self {
            Self::Local => None,
            Self::Remote(host) => Some(&host.server_id),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote(host) => write!(f, "{}:{}", host.destination(), host.port),
        }
    }
}
