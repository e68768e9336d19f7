//! Rollback snapshot tests.

mod common;

use common::*;
use dockhand_core::{AppPaths, DeploymentStatus};
use dockhand_deploy::{DeployError, RollbackManager};
use dockhand_exec::ExecutionContext;
use std::path::Path;

fn make_versioned(image: &str, value: &str) -> dockhand_core::ServiceDefinition {
    let mut def = make_definition("web-1", image);
    def.rollback_active = true;
    def.env.insert("RELEASE".into(), value.into());
    def
}

#[tokio::test]
async fn deploys_are_snapshotted_in_order() {
    let h = make_harness();
    let first = h
        .deployer
        .deploy(&make_versioned("nginx:1.0", "one"), "v1")
        .await
        .unwrap();
    assert_eq!(first.rollback_version, Some(1));
    assert_eq!(first.status, DeploymentStatus::Done);
    h.deployer
        .deploy(&make_versioned("nginx:2.0", "two"), "v2")
        .await
        .unwrap();

    let versions = h.deployer.list_rollbacks("web-1").unwrap();
    assert_eq!(versions.iter().map(|r| r.version).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(versions[0].image, "web-1:v1");
    assert_eq!(versions[0].env, vec!["RELEASE=one"]);
    assert_eq!(versions[0].deployment_id, first.id);
    assert!(h.engine.has_image("web-1:v1"));
    assert!(h.engine.has_image("web-1:v2"));
}

#[tokio::test]
async fn rollback_restores_image_and_environment() {
    let h = make_harness();
    h.deployer
        .deploy(&make_versioned("nginx:1.0", "one"), "v1")
        .await
        .unwrap();
    h.deployer
        .deploy(&make_versioned("nginx:2.0", "two"), "v2")
        .await
        .unwrap();
    let (version_before, spec) = h.engine.service("web-1").unwrap();
    assert_eq!(container_of(&spec).1, vec!["RELEASE=two"]);

    let record = h.deployer.rollback("web-1", 1).await.unwrap();
    assert_eq!(record.title, "Rollback to v1");
    assert_eq!(record.status, DeploymentStatus::Done);
    assert_eq!(record.image.as_deref(), Some("web-1:v1"));

    let (version, spec) = h.engine.service("web-1").unwrap();
    assert_eq!(version, version_before + 1);
    assert_eq!(
        container_of(&spec),
        ("web-1:v1".to_string(), vec!["RELEASE=one".to_string()])
    );
    assert_eq!(force_update_of(&spec), Some(2));

    // Rolling back is not itself snapshotted.
    assert_eq!(h.deployer.list_rollbacks("web-1").unwrap().len(), 2);
}

#[tokio::test]
async fn rollback_to_missing_version_fails() {
    let h = make_harness();
    let err = h.deployer.rollback("web-1", 9).await.unwrap_err();
    assert!(matches!(err, DeployError::RollbackNotFound { version: 9, .. }));
    assert!(h.engine.calls().is_empty());
}

#[tokio::test]
async fn delete_removes_record_even_without_image() {
    let h = make_harness();
    h.deployer
        .deploy(&make_versioned("nginx:1.0", "one"), "v1")
        .await
        .unwrap();
    h.deployer
        .deploy(&make_versioned("nginx:2.0", "two"), "v2")
        .await
        .unwrap();

    h.deployer.delete_rollback("web-1", 1).await.unwrap();
    assert!(!h.engine.has_image("web-1:v1"));

    // Image already gone: still deleted.
    h.engine.state.lock().unwrap().images.remove("web-1:v2");
    h.deployer.delete_rollback("web-1", 2).await.unwrap();
    assert!(h.deployer.list_rollbacks("web-1").unwrap().is_empty());

    let err = h.deployer.delete_rollback("web-1", 2).await.unwrap_err();
    assert!(matches!(err, DeployError::RollbackNotFound { .. }));
}

#[tokio::test]
async fn failed_snapshot_removes_its_tag() {
    let h = make_harness();
    h.engine.add_image("nginx:1.0");
    let manager = RollbackManager::new(
        h.engine.clone(),
        h.store.clone(),
        h.deployer.renderer().clone(),
        AppPaths::new(Path::new("/etc/dockhand")),
    );
    let def = make_versioned("nginx:1.0", "one");

    let err = manager
        .record(&ExecutionContext::Local, "no-such-deployment", &def, "nginx:1.0", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::State(_)));
    assert!(!h.engine.has_image("web-1:v1"));
    assert!(manager.list("web-1").unwrap().is_empty());
}

#[tokio::test]
async fn snapshot_disabled_leaves_no_versions() {
    let h = make_harness();
    let record = h
        .deployer
        .deploy(&make_definition("web-1", "nginx:1.0"), "plain")
        .await
        .unwrap();
    assert_eq!(record.rollback_version, None);
    assert!(h.deployer.list_rollbacks("web-1").unwrap().is_empty());
    assert!(!h.engine.has_image("web-1:v1"));
}

#[tokio::test]
async fn deleting_newest_snapshot_does_not_recycle_its_version() {
    let h = make_harness();
    for (image, value) in [("nginx:1.0", "one"), ("nginx:2.0", "two")] {
        h.deployer
            .deploy(&make_versioned(image, value), value)
            .await
            .unwrap();
    }
    h.deployer.delete_rollback("web-1", 2).await.unwrap();

    let record = h
        .deployer
        .deploy(&make_versioned("nginx:3.0", "three"), "three")
        .await
        .unwrap();
    assert_eq!(record.rollback_version, Some(3));
    assert!(h.engine.has_image("web-1:v3"));
    assert!(!h.engine.has_image("web-1:v2"));
    let versions: Vec<_> = h
        .deployer
        .list_rollbacks("web-1")
        .unwrap()
        .iter()
        .map(|r| r.version)
        .collect();
    assert_eq!(versions, vec![1, 3]);
}
