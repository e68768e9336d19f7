//! redb table definitions for the dockhand record store.

use redb::TableDefinition;

/// JSON-valued table keyed by string.
pub type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Deployment records keyed by deployment id.
pub const DEPLOYMENTS: JsonTable = TableDefinition::new("deployments");

/// Rollback records keyed by `{app_name}:{version:010}`.
pub const ROLLBACKS: JsonTable = TableDefinition::new("rollbacks");

/// Highest rollback version ever issued per application. Survives
/// deletion of the snapshot itself so versions are never reused.
pub const ROLLBACK_SEQ: TableDefinition<'static, &'static str, u32> =
    TableDefinition::new("rollback_seq");

/// Network records keyed by network id.
pub const NETWORKS: JsonTable = TableDefinition::new("networks");

/// Resource summaries keyed by resource id.
pub const RESOURCES: JsonTable = TableDefinition::new("resources");

pub fn rollback_key(app_name: &str, version: u32) -> String {
    format!("{app_name}:{version:010}")
}

pub fn rollback_prefix(app_name: &str) -> String {
    format!("{app_name}:")
}
