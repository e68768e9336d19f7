//! Network lifecycle and proxy connectivity tests.

mod common;

use common::*;
use dockhand_core::{DeploymentStatus, NetworkDriver, ResourceKind, ResourceSummary, ValidationError};
use dockhand_deploy::DeployError;
use dockhand_exec::ExecutionContext;
use dockhand_proxy::{ProxyError, SyncStats};

const PROXY: &str = "dockhand-traefik";

fn routed_app(network_id: &str) -> dockhand_core::ServiceDefinition {
    let mut def = make_definition("web-1", "nginx");
    def.custom_network_ids = vec![network_id.to_string()];
    def.domains = vec![make_domain("k1", "app.example.com")];
    def
}

#[tokio::test]
async fn create_records_engine_network() {
    let h = make_harness();
    let ctx = ExecutionContext::Local;
    let created = h
        .deployer
        .networks()
        .create(&ctx, make_network("backend", false))
        .await
        .unwrap();
    assert_eq!(created.docker_network_id.as_deref(), Some("id-backend-net"));
    assert!(h.store.get_network("backend").unwrap().is_some());

    let err = h
        .deployer
        .networks()
        .create(&ctx, make_network("backend", false))
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::AlreadyExists(_)));
}

#[tokio::test]
async fn deploy_attaches_proxy_service_and_delete_waits_for_release() {
    let h = make_harness();
    let ctx = ExecutionContext::Local;
    h.engine.add_proxy_service(PROXY);
    let networks = h.deployer.networks();
    networks.create(&ctx, make_network("backend", false)).await.unwrap();

    h.deployer.deploy(&routed_app("backend"), "routed").await.unwrap();
    assert!(h.engine.service_networks(PROXY).contains(&"backend-net".to_string()));
    let (_, spec) = h.engine.service("web-1").unwrap();
    let labels = spec.labels.unwrap();
    assert_eq!(labels["traefik.swarm.network"], "backend-net");

    let err = networks.delete(&ctx, "backend").await.unwrap_err();
    assert!(matches!(err, ProxyError::NetworkInUse { .. }));
    assert!(h.store.get_network("backend").unwrap().is_some());

    networks.unassign(&ctx, "web-1", "backend").await.unwrap();
    assert!(!h.engine.service_networks(PROXY).contains(&"backend-net".to_string()));

    networks.delete(&ctx, "backend").await.unwrap();
    assert!(h.store.get_network("backend").unwrap().is_none());
    assert!(h.engine.calls().contains(&"remove_network backend-net".to_string()));
}

#[tokio::test]
async fn live_endpoints_block_deletion() {
    let h = make_harness();
    let ctx = ExecutionContext::Local;
    let networks = h.deployer.networks();
    networks.create(&ctx, make_network("jobs", false)).await.unwrap();
    h.engine.add_endpoint("jobs-net", "worker-1");

    let err = networks.delete(&ctx, "jobs").await.unwrap_err();
    assert!(matches!(err, ProxyError::NetworkInUse { .. }));
    assert!(DeployError::from(err).to_string().contains("in use"));

    h.engine
        .state
        .lock()
        .unwrap()
        .networks
        .get_mut("jobs-net")
        .unwrap()
        .containers
        .clear();
    networks.delete(&ctx, "jobs").await.unwrap();
}

#[tokio::test]
async fn container_mode_fallback() {
    let h = make_harness();
    let ctx = ExecutionContext::Local;
    h.engine.add_proxy_container(PROXY);
    let networks = h.deployer.networks();
    networks.create(&ctx, make_network("backend", false)).await.unwrap();

    h.deployer.deploy(&routed_app("backend"), "routed").await.unwrap();
    assert!(h.engine.container_networks_of(PROXY).contains(&"backend-net".to_string()));

    // Redeploying does not connect twice.
    h.deployer.deploy(&routed_app("backend"), "again").await.unwrap();
    let connects = h
        .engine
        .calls()
        .iter()
        .filter(|c| c.starts_with("connect "))
        .count();
    assert_eq!(connects, 1);

    networks.unassign(&ctx, "web-1", "backend").await.unwrap();
    assert!(!h.engine.container_networks_of(PROXY).contains(&"backend-net".to_string()));
    networks.delete(&ctx, "backend").await.unwrap();
}

#[tokio::test]
async fn internal_networks_are_never_attached() {
    let h = make_harness();
    let ctx = ExecutionContext::Local;
    h.engine.add_proxy_service(PROXY);
    h.deployer
        .networks()
        .create(&ctx, make_network("private", true))
        .await
        .unwrap();

    h.deployer.deploy(&routed_app("private"), "internal").await.unwrap();
    assert_eq!(h.engine.service_networks(PROXY), vec!["dockhand-network"]);
    let labels = h.engine.service("web-1").unwrap().1.labels.unwrap();
    assert_eq!(labels["traefik.swarm.network"], "dockhand-network");
}

#[tokio::test]
async fn missing_proxy_fails_the_deployment() {
    let h = make_harness();
    let ctx = ExecutionContext::Local;
    h.deployer
        .networks()
        .create(&ctx, make_network("backend", false))
        .await
        .unwrap();

    let err = h.deployer.deploy(&routed_app("backend"), "routed").await.unwrap_err();
    assert!(matches!(err, DeployError::Proxy(ProxyError::ProxyNotFound(_))));
    assert!(h.engine.service("web-1").is_none());
    let records = h.deployer.deployments("web-1").unwrap();
    assert_eq!(records[0].status, DeploymentStatus::Error);
    // Nothing was rolled out, so nothing is recorded as referencing `backend`.
    assert!(h.store.get_resource("web-1").unwrap().is_none());
}

#[tokio::test]
async fn redeploy_without_domains_releases_proxy() {
    let h = make_harness();
    let ctx = ExecutionContext::Local;
    h.engine.add_proxy_service(PROXY);
    h.deployer
        .networks()
        .create(&ctx, make_network("backend", false))
        .await
        .unwrap();

    h.deployer.deploy(&routed_app("backend"), "routed").await.unwrap();
    assert!(h.engine.service_networks(PROXY).contains(&"backend-net".to_string()));

    let mut def = routed_app("backend");
    def.domains.clear();
    h.deployer.deploy(&def, "no domains").await.unwrap();
    assert_eq!(h.engine.service_networks(PROXY), vec!["dockhand-network"]);
    assert_eq!(h.store.get_resource("web-1").unwrap().unwrap().domain_count, 0);
}

#[tokio::test]
async fn redeploy_off_a_network_releases_proxy_unless_shared() {
    let h = make_harness();
    let ctx = ExecutionContext::Local;
    h.engine.add_proxy_service(PROXY);
    let networks = h.deployer.networks();
    networks.create(&ctx, make_network("backend", false)).await.unwrap();
    networks.create(&ctx, make_network("shared", false)).await.unwrap();

    let mut def = routed_app("backend");
    def.custom_network_ids.push("shared".into());
    h.deployer.deploy(&def, "both").await.unwrap();

    let mut other = make_definition("api-1", "nginx");
    other.custom_network_ids = vec!["shared".into()];
    other.domains = vec![make_domain("k2", "api.example.com")];
    h.deployer.deploy(&other, "api").await.unwrap();

    def.custom_network_ids.clear();
    h.deployer.deploy(&def, "default only").await.unwrap();
    assert_eq!(
        h.engine.service_networks(PROXY),
        vec!["dockhand-network", "shared-net"]
    );
    let labels = h.engine.service("web-1").unwrap().1.labels.unwrap();
    assert_eq!(labels["traefik.swarm.network"], "dockhand-network");
}

#[tokio::test]
async fn reconcile_repairs_drift() {
    let h = make_harness();
    let ctx = ExecutionContext::Local;
    h.engine.add_proxy_service(PROXY);
    let networks = h.deployer.networks();
    networks.create(&ctx, make_network("a", false)).await.unwrap();
    networks.create(&ctx, make_network("b", false)).await.unwrap();

    h.store
        .put_resource(&ResourceSummary {
            id: "shop".into(),
            kind: ResourceKind::Application,
            compose_type: None,
            custom_network_ids: vec!["a".into()],
            domain_count: 1,
            server_id: None,
        })
        .unwrap();
    // Stale attachment to `b` left behind by an interrupted run.
    h.deployer.connectivity().attach_proxy(&ctx, "b-net").await.unwrap();

    let stats = h.deployer.connectivity().reconcile(&ctx).await.unwrap();
    assert_eq!(
        stats,
        SyncStats {
            networks_required: 1,
            attached: 1,
            detached: 1,
        }
    );
    assert_eq!(h.engine.service_networks(PROXY), vec!["dockhand-network", "a-net"]);

    let again = h.deployer.connectivity().reconcile(&ctx).await.unwrap();
    assert_eq!(again.attached + again.detached, 0);
}

#[tokio::test]
async fn assign_checks_driver_and_attaches() {
    let h = make_harness();
    let ctx = ExecutionContext::Local;
    h.engine.add_proxy_service(PROXY);
    let networks = h.deployer.networks();
    let mut lan = make_network("lan", false);
    lan.driver = NetworkDriver::Bridge;
    networks.create(&ctx, lan).await.unwrap();
    networks.create(&ctx, make_network("backend", false)).await.unwrap();

    let mut def = make_definition("web-1", "nginx");
    def.domains = vec![make_domain("k1", "app.example.com")];
    h.deployer.deploy(&def, "plain").await.unwrap();

    let err = networks.assign(&ctx, "web-1", "lan").await.unwrap_err();
    assert!(matches!(err, ProxyError::Validation(_)));

    let resource = networks.assign(&ctx, "web-1", "backend").await.unwrap();
    assert_eq!(resource.custom_network_ids, vec!["backend"]);
    assert!(h.engine.service_networks(PROXY).contains(&"backend-net".to_string()));
}

#[tokio::test]
async fn domain_network_override_must_be_joined() {
    let h = make_harness();
    let ctx = ExecutionContext::Local;
    h.engine.add_proxy_service(PROXY);
    let networks = h.deployer.networks();
    networks.create(&ctx, make_network("backend", false)).await.unwrap();
    networks.create(&ctx, make_network("edge", false)).await.unwrap();

    let mut def = routed_app("backend");
    def.domains[0].network_id = Some("edge".into());
    let err = h.deployer.deploy(&def, "override").await.unwrap_err();
    assert!(matches!(
        err,
        DeployError::Validation(ValidationError::DomainNetworkNotJoined { ref network, .. }) if network == "edge"
    ));
    assert!(h.deployer.deployments("web-1").unwrap().is_empty());
    assert!(h.engine.service("web-1").is_none());

    // Joined, the override wins over the first custom network.
    def.custom_network_ids.push("edge".into());
    h.deployer.deploy(&def, "override").await.unwrap();
    let labels = h.engine.service("web-1").unwrap().1.labels.unwrap();
    assert_eq!(labels["traefik.swarm.network"], "edge-net");
}
