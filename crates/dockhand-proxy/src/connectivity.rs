//! Proxy connectivity: keeps the reverse proxy attached to exactly the
//! networks that domain-bearing resources use.
//!
//! The proxy is first treated as a swarm service (its task template's
//! network list is updated with the observed version index). When no such
//! service exists it is treated as a plain container and connected or
//! disconnected directly.
//!
//! Reference checks scan every resource summary in the store. Mutations
//! on the same network id are serialized in-process; across processes the
//! scan is only eventually consistent, and [`ConnectivityManager::reconcile`]
//! repairs drift.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use bollard::models::NetworkAttachmentConfig;
use dockhand_core::{Network, ProxyConfig, ResourceSummary, ValidationError};
use dockhand_exec::{Engine, ExecutionContext, ServiceProbe};
use dockhand_state::StateStore;
use tracing::{debug, info, warn};

use crate::error::{ProxyError, ProxyResult};

/// Outcome counters of a full reconcile.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub networks_required: u32,
    pub attached: u32,
    pub detached: u32,
}

pub struct ConnectivityManager {
    engine: Arc<dyn Engine>,
    store: StateStore,
    proxy: ProxyConfig,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConnectivityManager {
    pub fn new(engine: Arc<dyn Engine>, store: StateStore, proxy: ProxyConfig) -> Self {
        Self {
            engine,
            store,
            proxy,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, network_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(network_id.to_string()).or_default().clone()
    }

    fn network(&self, network_id: &str) -> ProxyResult<Network> {
        self.store
            .get_network(network_id)?
            .ok_or_else(|| ValidationError::UnknownNetwork(network_id.to_string()).into())
    }

    /// Whether any domain-bearing resource still needs the proxy on `network_id`.
    pub fn is_required(&self, network_id: &str) -> ProxyResult<bool> {
        Ok(self
            .store
            .resources_referencing(network_id)?
            .iter()
            .any(|r| r.needs_proxy_on(network_id)))
    }

    /// Ensure the proxy can reach every custom network of `resource`.
    /// Returns the names of networks the proxy was newly attached to.
    pub async fn attach_for_resource(
        &self,
        ctx: &ExecutionContext,
        resource: &ResourceSummary,
    ) -> ProxyResult<Vec<String>> {
        let mut attached = Vec::new();
        if resource.domain_count == 0 || !resource.kind.carries_domains() {
            return Ok(attached);
        }
        for network_id in &resource.custom_network_ids {
            let network = self.network(network_id)?;
            if network.internal {
                debug!(network = %network.network_name, "internal network, proxy not attached");
                continue;
            }
            let lock = self.lock_for(network_id);
            let _guard = lock.lock().await;
            if self.attach_proxy(ctx, &network.network_name).await? {
                attached.push(network.network_name.clone());
            }
        }
        Ok(attached)
    }

    /// Detach the proxy from `network_id` unless a domain-bearing resource
    /// still references it. Returns true if the proxy was detached.
    pub async fn release_network(&self, ctx: &ExecutionContext, network_id: &str) -> ProxyResult<bool> {
        let network = self.network(network_id)?;
        let lock = self.lock_for(network_id);
        let _guard = lock.lock().await;
        if self.is_required(network_id)? {
            debug!(network = %network.network_name, "network still required by proxy");
            return Ok(false);
        }
        self.detach_proxy(ctx, &network.network_name).await
    }

    /// Full sync for the target of `ctx`: attach to every required managed
    /// network, detach from managed networks no longer required.
    pub async fn reconcile(&self, ctx: &ExecutionContext) -> ProxyResult<SyncStats> {
        let server = ctx.server_id();
        let resources = self.store.list_resources()?;
        let required: BTreeSet<&str> = resources
            .iter()
            .filter(|r| r.server_id.as_deref() == server)
            .filter(|r| r.kind.carries_domains() && r.domain_count > 0)
            .flat_map(|r| r.custom_network_ids.iter().map(String::as_str))
            .collect();

        let mut stats = SyncStats::default();
        for network in self.store.list_networks()? {
            if network.server_id.as_deref() != server {
                continue;
            }
            let lock = self.lock_for(&network.id);
            let _guard = lock.lock().await;
            if required.contains(network.id.as_str()) && !network.internal {
                stats.networks_required += 1;
                if self.attach_proxy(ctx, &network.network_name).await? {
                    stats.attached += 1;
                }
            } else if self.detach_proxy(ctx, &network.network_name).await? {
                stats.detached += 1;
            }
        }

        info!(
            target_host = %ctx,
            required = stats.networks_required,
            attached = stats.attached,
            detached = stats.detached,
            "proxy connectivity reconciled"
        );
        Ok(stats)
    }

    // ── Engine side ────────────────────────────────────────────────

    /// Names and ids that identify `network_name` in attachment lists.
    async fn identities(&self, ctx: &ExecutionContext, network_name: &str) -> ProxyResult<Vec<String>> {
        let mut ids = vec![network_name.to_string()];
        if let Some(info) = self.engine.inspect_network(ctx, network_name).await? {
            if !info.id.is_empty() {
                ids.push(info.id);
            }
        }
        Ok(ids)
    }

    /// Returns true if the proxy was not attached before.
    pub async fn attach_proxy(&self, ctx: &ExecutionContext, network_name: &str) -> ProxyResult<bool> {
        let ids = self.identities(ctx, network_name).await?;
        match self.engine.inspect_service(ctx, &self.proxy.service_name).await? {
            ServiceProbe::Found(state) => {
                let mut spec = state.spec;
                let task = spec.task_template.get_or_insert_with(Default::default);
                let networks = task.networks.get_or_insert_with(Vec::new);
                if networks
                    .iter()
                    .any(|n| n.target.as_ref().is_some_and(|t| ids.contains(t)))
                {
                    return Ok(false);
                }
                networks.push(NetworkAttachmentConfig {
                    target: Some(network_name.to_string()),
                    ..Default::default()
                });
                self.engine
                    .update_service(ctx, &self.proxy.service_name, state.version, spec, None)
                    .await?;
                info!(network = %network_name, mode = "service", "proxy attached");
                Ok(true)
            }
            ServiceProbe::NotFound => {
                let container = &self.proxy.container_name;
                let current = self
                    .engine
                    .container_networks(ctx, container)
                    .await?
                    .ok_or_else(|| ProxyError::ProxyNotFound(self.proxy.service_name.clone()))?;
                if current.iter().any(|n| ids.contains(n)) {
                    return Ok(false);
                }
                self.engine.connect_container(ctx, network_name, container).await?;
                info!(network = %network_name, mode = "container", "proxy attached");
                Ok(true)
            }
        }
    }

    /// Returns true if the proxy was attached before.
    pub async fn detach_proxy(&self, ctx: &ExecutionContext, network_name: &str) -> ProxyResult<bool> {
        let ids = self.identities(ctx, network_name).await?;
        match self.engine.inspect_service(ctx, &self.proxy.service_name).await? {
            ServiceProbe::Found(state) => {
                let mut spec = state.spec;
                let Some(networks) = spec.task_template.as_mut().and_then(|t| t.networks.as_mut()) else {
                    return Ok(false);
                };
                let before = networks.len();
                networks.retain(|n| !n.target.as_ref().is_some_and(|t| ids.contains(t)));
                if networks.len() == before {
                    return Ok(false);
                }
                self.engine
                    .update_service(ctx, &self.proxy.service_name, state.version, spec, None)
                    .await?;
                info!(network = %network_name, mode = "service", "proxy detached");
                Ok(true)
            }
            ServiceProbe::NotFound => {
                let container = &self.proxy.container_name;
                let Some(current) = self.engine.container_networks(ctx, container).await? else {
                    warn!(%container, "proxy container not found, nothing to detach");
                    return Ok(false);
                };
                if !current.iter().any(|n| ids.contains(n)) {
                    return Ok(false);
                }
                self.engine.disconnect_container(ctx, network_name, container).await?;
                info!(network = %network_name, mode = "container", "proxy detached");
                Ok(true)
            }
        }
    }
}
