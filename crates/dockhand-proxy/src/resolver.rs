//! Advertised network resolution.
//!
//! The proxy reaches a service over exactly one network, announced with
//! `traefik.swarm.network`. Internal networks are never advertised: the
//! proxy cannot route through them.

use dockhand_core::{Network, ServiceDefinition};

/// Pick the network the proxy should use for `def`.
///
/// 1. the first non-internal network selected on any domain
/// 2. the first non-internal custom network of the definition
/// 3. the platform default network
///
/// `known` holds the network records referenced by `def`; ids without a
/// record are skipped.
pub fn resolve_network(def: &ServiceDefinition, known: &[Network], default_network: &str) -> String {
    let usable = |id: &str| {
        known
            .iter()
            .find(|n| n.id == id)
            .filter(|n| !n.internal)
            .map(|n| n.network_name.clone())
    };

    def.domains
        .iter()
        .filter_map(|d| d.network_id.as_deref())
        .find_map(usable)
        .or_else(|| def.custom_network_ids.iter().find_map(|id| usable(id)))
        .unwrap_or_else(|| default_network.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockhand_core::{CertificateType, Domain, NetworkDriver, SourceConfig};

    fn make_network(id: &str, internal: bool) -> Network {
        Network {
            id: id.into(),
            name: id.into(),
            network_name: format!("{id}-net"),
            driver: NetworkDriver::Overlay,
            subnet: None,
            gateway: None,
            ip_range: None,
            internal,
            attachable: true,
            organization_id: "org".into(),
            project_id: None,
            server_id: None,
            docker_network_id: None,
        }
    }

    fn make_domain(network_id: Option<&str>) -> Domain {
        Domain {
            host: "a.example.com".into(),
            path: None,
            port: 80,
            https: false,
            certificate: CertificateType::None,
            strip_path: false,
            internal_path: None,
            unique_config_key: "k".into(),
            network_id: network_id.map(String::from),
        }
    }

    fn make_definition(custom: &[&str], domains: Vec<Domain>) -> ServiceDefinition {
        ServiceDefinition {
            app_name: "web".into(),
            source: SourceConfig::Image {
                image: "nginx".into(),
                registry: None,
            },
            env: Default::default(),
            project_env: Default::default(),
            command: None,
            mounts: vec![],
            resources: Default::default(),
            replicas: 1,
            health_check: None,
            restart_policy: None,
            placement: None,
            update_config: None,
            rollback_config: None,
            labels: Default::default(),
            ports: vec![],
            custom_network_ids: custom.iter().map(|s| s.to_string()).collect(),
            domains,
            server_id: None,
            rollback_active: false,
        }
    }

    #[test]
    fn non_internal_custom_network_preferred_over_internal() {
        let known = vec![make_network("private", true), make_network("public", false)];
        let def = make_definition(&["private", "public"], vec![]);
        assert_eq!(resolve_network(&def, &known, "dockhand-network"), "public-net");
    }

    #[test]
    fn domain_selection_wins() {
        let known = vec![make_network("a", false), make_network("b", false)];
        let def = make_definition(&["a", "b"], vec![make_domain(Some("b"))]);
        assert_eq!(resolve_network(&def, &known, "default"), "b-net");
    }

    #[test]
    fn internal_domain_selection_falls_through() {
        let known = vec![make_network("a", false), make_network("b", true)];
        let def = make_definition(&["a", "b"], vec![make_domain(Some("b"))]);
        assert_eq!(resolve_network(&def, &known, "default"), "a-net");
    }

    #[test]
    fn default_when_nothing_usable() {
        let known = vec![make_network("a", true)];
        let def = make_definition(&["a", "unknown"], vec![make_domain(None)]);
        assert_eq!(resolve_network(&def, &known, "dockhand-network"), "dockhand-network");
    }
}
