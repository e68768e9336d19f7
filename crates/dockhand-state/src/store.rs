//! StateStore: redb-backed persistence for engine records.
//!
//! Typed operations over deployments, rollback versions, networks and
//! resource summaries. The store supports both on-disk and in-memory
//! backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use dockhand_core::{
    DeploymentRecord, DeploymentStatus, Network, ResourceSummary, RollbackRecord, epoch_secs,
};
use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;

/// Closure mapping a redb error into [`StateError::Backend`] for `stage`.
macro_rules! backend {
    ($stage:literal) => {
        |e| StateError::Backend {
            stage: $stage,
            message: e.to_string(),
        }
    };
}

/// Thread-safe record store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(|e| StateError::Open(e.to_string()))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(|e| StateError::Open(e.to_string()))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(backend!("begin"))?;
        // Opening a table in a write transaction creates it if absent.
        for table in [DEPLOYMENTS, ROLLBACKS, NETWORKS, RESOURCES] {
            txn.open_table(table).map_err(backend!("table"))?;
        }
        txn.open_table(ROLLBACK_SEQ).map_err(backend!("table"))?;
        txn.commit().map_err(backend!("commit"))?;
        Ok(())
    }

    // ── Generic helpers ────────────────────────────────────────────

    fn put<T: Serialize>(&self, table: JsonTable, key: &str, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value)?;
        let txn = self.db.begin_write().map_err(backend!("begin"))?;
        {
            let mut t = txn.open_table(table).map_err(backend!("table"))?;
            t.insert(key, bytes.as_slice()).map_err(backend!("put"))?;
        }
        txn.commit().map_err(backend!("commit"))?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, table: JsonTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(backend!("begin"))?;
        let t = txn.open_table(table).map_err(backend!("table"))?;
        match t.get(key).map_err(backend!("get"))? {
            Some(guard) => {
                let value = serde_json::from_slice(guard.value())?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// All values whose key starts with `prefix`, in key order.
    fn scan<T: DeserializeOwned>(&self, table: JsonTable, prefix: &str) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(backend!("begin"))?;
        let t = txn.open_table(table).map_err(backend!("table"))?;
        let mut results = Vec::new();
        for entry in t.range(prefix..).map_err(backend!("scan"))? {
            let (key, value) = entry.map_err(backend!("scan"))?;
            if !key.value().starts_with(prefix) {
                break;
            }
            results.push(serde_json::from_slice(value.value())?);
        }
        Ok(results)
    }

    fn remove(&self, table: JsonTable, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(backend!("begin"))?;
        let existed;
        {
            let mut t = txn.open_table(table).map_err(backend!("table"))?;
            existed = t.remove(key).map_err(backend!("remove"))?.is_some();
        }
        txn.commit().map_err(backend!("commit"))?;
        Ok(existed)
    }

    // ── Deployments ────────────────────────────────────────────────

    /// Insert or update a deployment record.
    pub fn put_deployment(&self, record: &DeploymentRecord) -> StateResult<()> {
        self.put(DEPLOYMENTS, &record.id, record)?;
        debug!(deployment = %record.id, status = ?record.status, "deployment stored");
        Ok(())
    }

    pub fn get_deployment(&self, id: &str) -> StateResult<Option<DeploymentRecord>> {
        self.get(DEPLOYMENTS, id)
    }

    /// Deployments of one application, oldest first.
    pub fn list_deployments_for_app(&self, app_name: &str) -> StateResult<Vec<DeploymentRecord>> {
        let mut records: Vec<DeploymentRecord> = self
            .scan::<DeploymentRecord>(DEPLOYMENTS, "")?
            .into_iter()
            .filter(|d| d.app_name == app_name)
            .collect();
        records.sort_by_key(|d| d.created_at);
        Ok(records)
    }

    /// Mark a deployment finished and, when given, append its rollback
    /// version, all in one write transaction.
    ///
    /// Fails with `NotFound` if the deployment does not exist and with
    /// `Conflict` if the rollback version is not above every version
    /// issued so far for the app, deleted ones included. Either way
    /// nothing is written.
    pub fn finish_deployment(
        &self,
        deployment_id: &str,
        status: DeploymentStatus,
        error: Option<String>,
        rollback: Option<&RollbackRecord>,
    ) -> StateResult<DeploymentRecord> {
        let txn = self.db.begin_write().map_err(backend!("begin"))?;
        let record = {
            let mut deployments = txn.open_table(DEPLOYMENTS).map_err(backend!("table"))?;
            let existing: Option<DeploymentRecord> = deployments
                .get(deployment_id)
                .map_err(backend!("get"))?
                .map(|guard| serde_json::from_slice(guard.value()))
                .transpose()?;
            let mut record = existing
                .ok_or_else(|| StateError::NotFound(format!("deployment {deployment_id}")))?;

            if let Some(rb) = rollback {
                let key = rollback_key(&rb.app_name, rb.version);
                let mut rollbacks = txn.open_table(ROLLBACKS).map_err(backend!("table"))?;
                let mut seq = txn.open_table(ROLLBACK_SEQ).map_err(backend!("table"))?;
                let issued = seq
                    .get(rb.app_name.as_str())
                    .map_err(backend!("get"))?
                    .map(|guard| guard.value())
                    .unwrap_or(0);
                let taken = rollbacks.get(key.as_str()).map_err(backend!("get"))?.is_some();
                if taken || rb.version <= issued {
                    return Err(StateError::Conflict(format!(
                        "rollback version {} of {} already issued",
                        rb.version, rb.app_name
                    )));
                }
                let bytes = serde_json::to_vec(rb)?;
                rollbacks
                    .insert(key.as_str(), bytes.as_slice())
                    .map_err(backend!("put"))?;
                seq.insert(rb.app_name.as_str(), rb.version)
                    .map_err(backend!("put"))?;
                record.rollback_version = Some(rb.version);
            }

            record.status = status;
            record.error = error;
            record.finished_at = Some(epoch_secs());
            let bytes = serde_json::to_vec(&record)?;
            deployments
                .insert(deployment_id, bytes.as_slice())
                .map_err(backend!("put"))?;
            record
        };
        txn.commit().map_err(backend!("commit"))?;
        debug!(
            deployment = %deployment_id,
            status = ?record.status,
            rollback_version = ?record.rollback_version,
            "deployment finished"
        );
        Ok(record)
    }

    // ── Rollbacks ──────────────────────────────────────────────────

    /// Rollback versions of an application in ascending order.
    pub fn list_rollbacks(&self, app_name: &str) -> StateResult<Vec<RollbackRecord>> {
        self.scan(ROLLBACKS, &rollback_prefix(app_name))
    }

    pub fn get_rollback(&self, app_name: &str, version: u32) -> StateResult<Option<RollbackRecord>> {
        self.get(ROLLBACKS, &rollback_key(app_name, version))
    }

    /// The version the next rollback record of `app_name` should take:
    /// one above the highest version ever issued, even if that snapshot
    /// has since been deleted.
    pub fn next_rollback_version(&self, app_name: &str) -> StateResult<u32> {
        let txn = self.db.begin_read().map_err(backend!("begin"))?;
        let seq = txn.open_table(ROLLBACK_SEQ).map_err(backend!("table"))?;
        let issued = seq
            .get(app_name)
            .map_err(backend!("get"))?
            .map(|guard| guard.value())
            .unwrap_or(0);
        Ok(issued + 1)
    }

    /// Delete a rollback record. Returns true if it existed.
    pub fn delete_rollback(&self, app_name: &str, version: u32) -> StateResult<bool> {
        let existed = self.remove(ROLLBACKS, &rollback_key(app_name, version))?;
        debug!(app = %app_name, version, existed, "rollback record deleted");
        Ok(existed)
    }

    // ── Networks ───────────────────────────────────────────────────

    pub fn put_network(&self, network: &Network) -> StateResult<()> {
        self.put(NETWORKS, &network.id, network)?;
        debug!(network = %network.id, name = %network.network_name, "network stored");
        Ok(())
    }

    pub fn get_network(&self, id: &str) -> StateResult<Option<Network>> {
        self.get(NETWORKS, id)
    }

    pub fn list_networks(&self) -> StateResult<Vec<Network>> {
        self.scan(NETWORKS, "")
    }

    /// Look up a network by its engine name on a given server.
    pub fn find_network_by_name(
        &self,
        network_name: &str,
        server_id: Option<&str>,
    ) -> StateResult<Option<Network>> {
        Ok(self
            .list_networks()?
            .into_iter()
            .find(|n| n.network_name == network_name && n.server_id.as_deref() == server_id))
    }

    pub fn delete_network(&self, id: &str) -> StateResult<bool> {
        self.remove(NETWORKS, id)
    }

    // ── Resources ──────────────────────────────────────────────────

    pub fn put_resource(&self, resource: &ResourceSummary) -> StateResult<()> {
        self.put(RESOURCES, &resource.id, resource)
    }

    pub fn get_resource(&self, id: &str) -> StateResult<Option<ResourceSummary>> {
        self.get(RESOURCES, id)
    }

    pub fn list_resources(&self) -> StateResult<Vec<ResourceSummary>> {
        self.scan(RESOURCES, "")
    }

    /// Every resource that lists `network_id` among its custom networks.
    pub fn resources_referencing(&self, network_id: &str) -> StateResult<Vec<ResourceSummary>> {
        Ok(self
            .list_resources()?
            .into_iter()
            .filter(|r| r.references(network_id))
            .collect())
    }

    pub fn delete_resource(&self, id: &str) -> StateResult<bool> {
        self.remove(RESOURCES, id)
    }
}
