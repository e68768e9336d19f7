//! Service spec assembly.
//!
//! Pure translation of a definition plus its resolved inputs into the
//! engine's declarative service request.

use std::collections::HashMap;

use bollard::models::{
    EndpointPortConfig, EndpointPortConfigProtocolEnum, EndpointPortConfigPublishModeEnum,
    EndpointSpec, HealthConfig, Limit, Mount as EngineMount, MountTypeEnum,
    NetworkAttachmentConfig, ResourceObject, ServiceSpec, ServiceSpecMode,
    ServiceSpecModeReplicated, ServiceSpecRollbackConfig, ServiceSpecRollbackConfigFailureActionEnum,
    ServiceSpecRollbackConfigOrderEnum, ServiceSpecUpdateConfig,
    ServiceSpecUpdateConfigFailureActionEnum, ServiceSpecUpdateConfigOrderEnum, TaskSpec,
    TaskSpecContainerSpec, TaskSpecPlacement, TaskSpecResources, TaskSpecRestartPolicy,
    TaskSpecRestartPolicyConditionEnum,
};
use dockhand_core::validate::parse_resource;
use dockhand_core::{
    AppPaths, FailureAction, Mount, MountKind, Network, NetworkDriver, PortBinding, PortProtocol,
    PublishMode, ResourceSpec, RestartCondition, ServiceDefinition, UpdateOrder, UpdatePolicy,
    ValidationError, ValidationResult,
};

use dockhand_proxy::Labels;

/// Constraint applied when mounts pin state to the manager node.
pub const MANAGER_CONSTRAINT: &str = "node.role==manager";

/// Resolved inputs for one service spec.
#[derive(Debug, Clone)]
pub struct SpecInput<'a> {
    pub definition: &'a ServiceDefinition,
    pub image: &'a str,
    /// Prepared `KEY=VALUE` environment.
    pub env: &'a [String],
    /// Final service labels (static merged with generated).
    pub labels: Labels,
    /// Records of the definition's custom networks.
    pub networks: &'a [Network],
    pub default_network: &'a str,
    pub paths: &'a AppPaths,
}

// ── Resources ──────────────────────────────────────────────────────

/// Numeric strings to limits and reservations (memory bytes, nano-CPUs).
pub fn parse_resources(spec: &ResourceSpec) -> ValidationResult<TaskSpecResources> {
    let memory_limit = parse_resource("memory_limit", spec.memory_limit.as_deref())?;
    let cpu_limit = parse_resource("cpu_limit", spec.cpu_limit.as_deref())?;
    let memory_reservation = parse_resource("memory_reservation", spec.memory_reservation.as_deref())?;
    let cpu_reservation = parse_resource("cpu_reservation", spec.cpu_reservation.as_deref())?;

    Ok(TaskSpecResources {
        limits: (memory_limit.is_some() || cpu_limit.is_some()).then(|| Limit {
            memory_bytes: memory_limit,
            nano_cpus: cpu_limit,
            ..Default::default()
        }),
        reservations: (memory_reservation.is_some() || cpu_reservation.is_some()).then(|| {
            ResourceObject {
                memory_bytes: memory_reservation,
                nano_cpus: cpu_reservation,
                ..Default::default()
            }
        }),
    })
}

// ── Mounts ─────────────────────────────────────────────────────────

/// Volume mounts, bind mounts, then synthesized file mounts.
pub fn build_mounts(app_name: &str, mounts: &[Mount], paths: &AppPaths) -> Vec<EngineMount> {
    let volume = mounts.iter().filter_map(|m| match &m.kind {
        MountKind::Volume { volume_name } => Some(EngineMount {
            typ: Some(MountTypeEnum::VOLUME),
            source: Some(volume_name.clone()),
            target: Some(m.mount_path.clone()),
            ..Default::default()
        }),
        _ => None,
    });
    let bind = mounts.iter().filter_map(|m| match &m.kind {
        MountKind::Bind { host_path } => Some(EngineMount {
            typ: Some(MountTypeEnum::BIND),
            source: Some(host_path.clone()),
            target: Some(m.mount_path.clone()),
            ..Default::default()
        }),
        _ => None,
    });
    let file = mounts.iter().filter_map(|m| match &m.kind {
        MountKind::File { file_path, .. } => Some(EngineMount {
            typ: Some(MountTypeEnum::BIND),
            source: Some(paths.file_mount_source(app_name, file_path)),
            target: Some(m.mount_path.clone()),
            ..Default::default()
        }),
        _ => None,
    });
    volume.chain(bind).chain(file).collect()
}

// ── Networks ───────────────────────────────────────────────────────

/// Default platform network plus every custom network.
///
/// Swarm services can only join overlay networks; a bridge network here
/// is a validation error.
pub fn build_networks(
    def: &ServiceDefinition,
    networks: &[Network],
    default_network: &str,
) -> ValidationResult<Vec<NetworkAttachmentConfig>> {
    let mut out = vec![NetworkAttachmentConfig {
        target: Some(default_network.to_string()),
        ..Default::default()
    }];
    for id in &def.custom_network_ids {
        let network = networks
            .iter()
            .find(|n| &n.id == id)
            .ok_or_else(|| ValidationError::UnknownNetwork(id.clone()))?;
        if network.driver != NetworkDriver::Overlay {
            return Err(ValidationError::IncompatibleDriver {
                network: network.network_name.clone(),
                driver: network.driver.as_str().to_string(),
                workload: "a swarm service".to_string(),
            });
        }
        if network.network_name != default_network {
            out.push(NetworkAttachmentConfig {
                target: Some(network.network_name.clone()),
                ..Default::default()
            });
        }
    }
    Ok(out)
}

// ── Policies ───────────────────────────────────────────────────────

fn update_config(policy: &UpdatePolicy) -> ServiceSpecUpdateConfig {
    ServiceSpecUpdateConfig {
        parallelism: Some(policy.parallelism),
        delay: policy.delay,
        monitor: policy.monitor,
        max_failure_ratio: policy.max_failure_ratio,
        order: Some(match policy.order {
            UpdateOrder::StartFirst => ServiceSpecUpdateConfigOrderEnum::START_FIRST,
            UpdateOrder::StopFirst => ServiceSpecUpdateConfigOrderEnum::STOP_FIRST,
        }),
        failure_action: policy.failure_action.map(|a| match a {
            FailureAction::Continue => ServiceSpecUpdateConfigFailureActionEnum::CONTINUE,
            FailureAction::Pause => ServiceSpecUpdateConfigFailureActionEnum::PAUSE,
            FailureAction::Rollback => ServiceSpecUpdateConfigFailureActionEnum::ROLLBACK,
        }),
    }
}

fn rollback_config(policy: &UpdatePolicy) -> ValidationResult<ServiceSpecRollbackConfig> {
    let failure_action = match policy.failure_action {
        None => None,
        Some(FailureAction::Continue) => Some(ServiceSpecRollbackConfigFailureActionEnum::CONTINUE),
        Some(FailureAction::Pause) => Some(ServiceSpecRollbackConfigFailureActionEnum::PAUSE),
        Some(FailureAction::Rollback) => {
            return Err(ValidationError::Invalid {
                field: "rollback_config.failure_action",
                reason: "a rollback cannot itself roll back".to_string(),
            });
        }
    };
    Ok(ServiceSpecRollbackConfig {
        parallelism: Some(policy.parallelism),
        delay: policy.delay,
        monitor: policy.monitor,
        max_failure_ratio: policy.max_failure_ratio,
        order: Some(match policy.order {
            UpdateOrder::StartFirst => ServiceSpecRollbackConfigOrderEnum::START_FIRST,
            UpdateOrder::StopFirst => ServiceSpecRollbackConfigOrderEnum::STOP_FIRST,
        }),
        failure_action,
    })
}

fn restart_policy(def: &ServiceDefinition) -> Option<TaskSpecRestartPolicy> {
    def.restart_policy.as_ref().map(|p| TaskSpecRestartPolicy {
        condition: Some(match p.condition {
            RestartCondition::None => TaskSpecRestartPolicyConditionEnum::NONE,
            RestartCondition::OnFailure => TaskSpecRestartPolicyConditionEnum::ON_FAILURE,
            RestartCondition::Any => TaskSpecRestartPolicyConditionEnum::ANY,
        }),
        delay: p.delay,
        max_attempts: p.max_attempts,
        window: p.window,
    })
}

fn placement(def: &ServiceDefinition) -> Option<TaskSpecPlacement> {
    match &def.placement {
        Some(p) => Some(TaskSpecPlacement {
            constraints: Some(p.constraints.clone()),
            max_replicas: p.max_replicas,
            ..Default::default()
        }),
        None if !def.mounts.is_empty() => Some(TaskSpecPlacement {
            constraints: Some(vec![MANAGER_CONSTRAINT.to_string()]),
            ..Default::default()
        }),
        None => None,
    }
}

fn endpoint_spec(ports: &[PortBinding]) -> Option<EndpointSpec> {
    if ports.is_empty() {
        return None;
    }
    Some(EndpointSpec {
        ports: Some(
            ports
                .iter()
                .map(|p| EndpointPortConfig {
                    target_port: Some(i64::from(p.target_port)),
                    published_port: Some(i64::from(p.published_port)),
                    protocol: Some(match p.protocol {
                        PortProtocol::Tcp => EndpointPortConfigProtocolEnum::TCP,
                        PortProtocol::Udp => EndpointPortConfigProtocolEnum::UDP,
                    }),
                    publish_mode: Some(match p.publish_mode {
                        PublishMode::Ingress => EndpointPortConfigPublishModeEnum::INGRESS,
                        PublishMode::Host => EndpointPortConfigPublishModeEnum::HOST,
                    }),
                    ..Default::default()
                })
                .collect(),
        ),
        ..Default::default()
    })
}

// ── Assembly ───────────────────────────────────────────────────────

pub fn build_service_spec(input: &SpecInput<'_>) -> ValidationResult<ServiceSpec> {
    let def = input.definition;
    let mounts = build_mounts(&def.app_name, &def.mounts, input.paths);
    let networks = build_networks(def, input.networks, input.default_network)?;
    let default_policy = UpdatePolicy::default();

    let container_spec = TaskSpecContainerSpec {
        image: Some(input.image.to_string()),
        env: Some(input.env.to_vec()),
        mounts: (!mounts.is_empty()).then_some(mounts),
        command: def
            .command
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .map(|c| vec!["/bin/sh".to_string(), "-c".to_string(), c.to_string()]),
        health_check: def.health_check.as_ref().map(|h| HealthConfig {
            test: Some(h.test.clone()),
            interval: h.interval,
            timeout: h.timeout,
            start_period: h.start_period,
            retries: h.retries,
            ..Default::default()
        }),
        ..Default::default()
    };

    Ok(ServiceSpec {
        name: Some(def.app_name.clone()),
        labels: Some(input.labels.clone().into_iter().collect::<HashMap<_, _>>()),
        task_template: Some(TaskSpec {
            container_spec: Some(container_spec),
            resources: Some(parse_resources(&def.resources)?),
            restart_policy: restart_policy(def),
            placement: placement(def),
            networks: Some(networks),
            ..Default::default()
        }),
        mode: Some(ServiceSpecMode {
            replicated: Some(ServiceSpecModeReplicated {
                replicas: Some(i64::from(def.replicas)),
            }),
            ..Default::default()
        }),
        update_config: Some(update_config(def.update_config.as_ref().unwrap_or(&default_policy))),
        rollback_config: Some(rollback_config(
            def.rollback_config.as_ref().unwrap_or(&default_policy),
        )?),
        endpoint_spec: endpoint_spec(&def.ports),
        ..Default::default()
    })
}
