//! dockhand-state: the engine's own records, kept in an embedded redb file.
//!
//! Only what the engine writes lives here: deployment logs and status,
//! rollback snapshots, and the network and resource summaries that the
//! proxy connectivity scan reads back.
//!
//! # Components
//!
//! - **`tables`**: table definitions and the `{app}:{version:010}` rollback
//!   key, which keeps a prefix scan in version order
//! - **`store`**: [`StateStore`], a cheaply cloned `Arc<Database>` handle
//!   storing JSON-encoded values
//! - **`error`**: [`StateError`]

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::StateStore;
