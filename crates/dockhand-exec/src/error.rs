//! Gateway error types.
//!
//! Transport failures (host unreachable, SSH auth, socket timeouts) are
//! kept apart from failures reported by the engine or by a command, so
//! callers can tell "could not ask" from "asked and got no".

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("transport to {target} failed: {message}")]
    Transport { target: String, message: String },

    #[error("command exited with status {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    #[error("not found: {0}")]
    NotFound(String),

    /// The object changed since it was inspected (stale version index).
    #[error("conflict on {0}")]
    Conflict(String),

    #[error("engine error ({status}): {message}")]
    Engine { status: u16, message: String },

    /// The daemon refused mid-stream, e.g. a pull that is denied or whose
    /// manifest does not exist.
    #[error("engine rejected {object}: {message}")]
    Rejected { object: String, message: String },

    #[error("undecodable engine reply for {object}: {message}")]
    Decode { object: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecError {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

pub type ExecResult<T> = Result<T, ExecError>;
