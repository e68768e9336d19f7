//! dockhand-exec: remote execution gateway.
//!
//! Every side effect on a target host goes through this crate, either as
//! a POSIX shell command or as a container engine API call. The target is
//! an explicit [`ExecutionContext`] threaded through each call, so the
//! same code path serves the local host and SSH-reachable servers.
//!
//! # Components
//!
//! - **`ExecutionContext`**: local vs. remote target, resolved from `dockhand.toml`
//! - **`Shell`** / **`SystemShell`**: `sh -c` locally, `ssh … sh -s` remotely
//! - **`Engine`** / **`DockerEngine`**: bollard client, tunneled over SSH for remote hosts
//! - **`files`**: base64 file materialization commands

pub mod context;
pub mod engine;
pub mod error;
pub mod files;
pub mod shell;

pub use context::{ExecutionContext, RemoteHost};
pub use engine::{
    DockerEngine, Engine, NetworkCreateRequest, NetworkInfo, RegistryCredentials, ServiceProbe,
    ServiceState,
};
pub use error::{ExecError, ExecResult};
pub use shell::{ExecOutput, Shell, SystemShell};
