//! Network lifecycle: create, delete, assign to and unassign from
//! resources.

use std::collections::HashMap;
use std::sync::Arc;

use dockhand_core::validate::check_driver_compatibility;
use dockhand_core::{Network, ResourceSummary, ValidationError};
use dockhand_exec::{Engine, ExecError, ExecutionContext, NetworkCreateRequest};
use dockhand_state::StateStore;
use tracing::{info, warn};

use crate::connectivity::ConnectivityManager;
use crate::error::{ProxyError, ProxyResult};

pub struct NetworkManager {
    engine: Arc<dyn Engine>,
    store: StateStore,
    connectivity: Arc<ConnectivityManager>,
    default_network: String,
}

impl NetworkManager {
    pub fn new(
        engine: Arc<dyn Engine>,
        store: StateStore,
        connectivity: Arc<ConnectivityManager>,
        default_network: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            store,
            connectivity,
            default_network: default_network.into(),
        }
    }

    /// Ownership labels stamped on engine networks.
    fn labels(network: &Network) -> HashMap<String, String> {
        let mut labels = HashMap::from([
            ("dockhand.network.id".to_string(), network.id.clone()),
            (
                "dockhand.organization.id".to_string(),
                network.organization_id.clone(),
            ),
        ]);
        if let Some(project) = &network.project_id {
            labels.insert("dockhand.project.id".to_string(), project.clone());
        }
        labels
    }

    /// Create `network` on its target and record it. An empty id is
    /// replaced with a fresh one.
    pub async fn create(&self, ctx: &ExecutionContext, mut network: Network) -> ProxyResult<Network> {
        if network.network_name.trim().is_empty() {
            return Err(ValidationError::MissingField("network_name").into());
        }
        if network.network_name == self.default_network {
            return Err(ProxyError::AlreadyExists(format!(
                "{} is the platform network",
                network.network_name
            )));
        }
        if network.id.is_empty() {
            network.id = uuid::Uuid::new_v4().to_string();
        }
        if self.store.get_network(&network.id)?.is_some() {
            return Err(ProxyError::AlreadyExists(format!("network id {}", network.id)));
        }
        if self
            .store
            .find_network_by_name(&network.network_name, network.server_id.as_deref())?
            .is_some()
            || self.engine.inspect_network(ctx, &network.network_name).await?.is_some()
        {
            return Err(ProxyError::AlreadyExists(format!("network {}", network.network_name)));
        }

        let request = NetworkCreateRequest {
            name: network.network_name.clone(),
            driver: network.driver.as_str().to_string(),
            internal: network.internal,
            attachable: network.attachable,
            subnet: network.subnet.clone(),
            gateway: network.gateway.clone(),
            ip_range: network.ip_range.clone(),
            labels: Self::labels(&network),
        };
        self.engine.create_network(ctx, &request).await?;
        network.docker_network_id = self
            .engine
            .inspect_network(ctx, &network.network_name)
            .await?
            .map(|info| info.id)
            .filter(|id| !id.is_empty());
        self.store.put_network(&network)?;
        info!(
            network = %network.network_name,
            id = %network.id,
            driver = network.driver.as_str(),
            target_host = %ctx,
            "network created"
        );
        Ok(network)
    }

    /// Delete a network. Refused while any resource lists it or the
    /// engine still reports endpoints on it.
    pub async fn delete(&self, ctx: &ExecutionContext, network_id: &str) -> ProxyResult<()> {
        let network = self
            .store
            .get_network(network_id)?
            .ok_or_else(|| ProxyError::NotFound(format!("network {network_id}")))?;

        let users = self.store.resources_referencing(network_id)?;
        if !users.is_empty() {
            let ids: Vec<_> = users.iter().map(|r| r.id.as_str()).collect();
            return Err(ProxyError::NetworkInUse {
                network: network.network_name,
                reason: format!("referenced by {}", ids.join(", ")),
            });
        }

        // A leftover proxy attachment must not block deletion.
        self.connectivity.release_network(ctx, network_id).await?;

        if let Some(info) = self.engine.inspect_network(ctx, &network.network_name).await? {
            if info.has_endpoints() {
                return Err(ProxyError::NetworkInUse {
                    network: network.network_name,
                    reason: format!("{} live endpoint(s)", info.containers.len()),
                });
            }
            match self.engine.remove_network(ctx, &network.network_name).await {
                Ok(()) | Err(ExecError::NotFound(_)) => {}
                Err(ExecError::Conflict(message)) => {
                    return Err(ProxyError::NetworkInUse {
                        network: network.network_name,
                        reason: message,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            warn!(network = %network.network_name, "network missing on target, dropping record");
        }

        self.store.delete_network(network_id)?;
        info!(network = %network.network_name, id = %network_id, "network deleted");
        Ok(())
    }

    fn load_pair(&self, resource_id: &str, network_id: &str) -> ProxyResult<(ResourceSummary, Network)> {
        let resource = self
            .store
            .get_resource(resource_id)?
            .ok_or_else(|| ProxyError::NotFound(format!("resource {resource_id}")))?;
        let network = self
            .store
            .get_network(network_id)?
            .ok_or_else(|| ValidationError::UnknownNetwork(network_id.to_string()))?;
        Ok((resource, network))
    }

    /// Add `network_id` to a resource's custom networks. The running
    /// workload picks the network up on its next deployment; the proxy is
    /// attached immediately when the resource carries domains.
    pub async fn assign(
        &self,
        ctx: &ExecutionContext,
        resource_id: &str,
        network_id: &str,
    ) -> ProxyResult<ResourceSummary> {
        let (mut resource, network) = self.load_pair(resource_id, network_id)?;
        if resource.server_id != network.server_id {
            return Err(ValidationError::Invalid {
                field: "network",
                reason: format!(
                    "network {} and resource {} live on different servers",
                    network.network_name, resource.id
                ),
            }
            .into());
        }
        check_driver_compatibility(&resource, &network)?;

        if !resource.references(network_id) {
            resource.custom_network_ids.push(network_id.to_string());
            self.store.put_resource(&resource)?;
            info!(resource = %resource.id, network = %network.network_name, "network assigned");
        }
        if resource.needs_proxy_on(network_id) {
            self.connectivity.attach_for_resource(ctx, &resource).await?;
        }
        Ok(resource)
    }

    /// Remove `network_id` from a resource and release the proxy if the
    /// network is no longer needed for routing.
    pub async fn unassign(
        &self,
        ctx: &ExecutionContext,
        resource_id: &str,
        network_id: &str,
    ) -> ProxyResult<ResourceSummary> {
        let (mut resource, network) = self.load_pair(resource_id, network_id)?;
        let before = resource.custom_network_ids.len();
        resource.custom_network_ids.retain(|id| id != network_id);
        if resource.custom_network_ids.len() != before {
            self.store.put_resource(&resource)?;
            info!(resource = %resource.id, network = %network.network_name, "network unassigned");
        }
        self.connectivity.release_network(ctx, network_id).await?;
        Ok(resource)
    }
}
