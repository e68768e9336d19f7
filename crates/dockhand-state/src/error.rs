//! Failures surfaced by [`StateStore`](crate::StateStore).

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot open record store: {0}")]
    Open(String),

    /// Any redb failure after the database is open. `stage` names the
    /// step that failed: `begin`, `commit`, `table`, `get`, `put`, `remove` or `scan`.
    #[error("record store {stage} failed: {message}")]
    Backend { stage: &'static str, message: String },

    /// A record that could not be encoded, or a stored value that no
    /// longer decodes into its type.
    #[error("record codec: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("no such record: {0}")]
    NotFound(String),

    /// The write would overwrite a record that must stay unique.
    #[error("record already exists: {0}")]
    Conflict(String),
}
