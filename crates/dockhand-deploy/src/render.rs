//! Definition to service spec, with routing and network inputs resolved
//! from configuration and the state store.

use bollard::models::ServiceSpec;
use dockhand_core::{
    AppPaths, EngineConfig, Network, RoutingProvider, ServiceDefinition, ValidationError,
};
use dockhand_core::validate::validate_domains;
use dockhand_proxy::{Labels, generate_labels, merge_labels, resolve_network};
use dockhand_state::StateStore;

use crate::error::DeployResult;
use crate::spec::{SpecInput, build_service_spec};

#[derive(Clone)]
pub struct SpecRenderer {
    config: EngineConfig,
    store: StateStore,
    paths: AppPaths,
}

impl SpecRenderer {
    pub fn new(config: EngineConfig, store: StateStore) -> Self {
        let paths = config.paths();
        Self {
            config,
            store,
            paths,
        }
    }

    /// Network records for the definition's custom network ids.
    pub fn custom_networks(&self, def: &ServiceDefinition) -> DeployResult<Vec<Network>> {
        def.custom_network_ids
            .iter()
            .map(|id| -> DeployResult<Network> {
                self.store
                    .get_network(id)?
                    .ok_or_else(|| ValidationError::UnknownNetwork(id.clone()).into())
            })
            .collect()
    }

    /// Routing labels for `def`. With the file provider the domains are
    /// validated but routing lives in the dynamic config file instead.
    pub fn routing_labels(&self, def: &ServiceDefinition, networks: &[Network]) -> DeployResult<Labels> {
        let proxy = &self.config.proxy;
        match proxy.provider {
            RoutingProvider::Labels => {
                let network = resolve_network(def, networks, &proxy.default_network);
                Ok(generate_labels(&def.app_name, &def.domains, &network, proxy)?)
            }
            RoutingProvider::File => {
                validate_domains(&def.app_name, &def.domains)?;
                Ok(Labels::new())
            }
        }
    }

    /// Full service spec for `def` running `image` with `env`.
    pub fn render(&self, def: &ServiceDefinition, image: &str, env: &[String]) -> DeployResult<ServiceSpec> {
        let networks = self.custom_networks(def)?;
        let generated = self.routing_labels(def, &networks)?;
        let labels = merge_labels(&def.labels, &generated);
        Ok(build_service_spec(&SpecInput {
            definition: def,
            image,
            env,
            labels,
            networks: &networks,
            default_network: &self.config.proxy.default_network,
            paths: &self.paths,
        })?)
    }
}
