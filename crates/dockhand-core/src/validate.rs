//! Pre-mutation checks on service definitions, domains and networks.

use std::collections::HashSet;

use crate::error::{ValidationError, ValidationResult};
use crate::types::{Domain, Network, NetworkDriver, ResourceSummary, ServiceDefinition};

/// Reject domain sets that would produce colliding or malformed routers.
pub fn validate_domains(app_name: &str, domains: &[Domain]) -> ValidationResult<()> {
    let mut seen = HashSet::new();
    for domain in domains {
        if domain.host.trim().is_empty() {
            return Err(ValidationError::MissingField("domain.host"));
        }
        if domain.unique_config_key.trim().is_empty() {
            return Err(ValidationError::MissingField("domain.unique_config_key"));
        }
        if !seen.insert(domain.unique_config_key.as_str()) {
            return Err(ValidationError::DuplicateConfigKey {
                app: app_name.to_string(),
                key: domain.unique_config_key.clone(),
            });
        }
        if domain.strip_path && domain.non_root_path().is_none() {
            return Err(ValidationError::StripPathOnRoot {
                host: domain.host.clone(),
            });
        }
        if let Some(internal) = domain.internal_path.as_deref() {
            if !internal.is_empty() && !internal.starts_with('/') {
                return Err(ValidationError::InvalidInternalPath {
                    host: domain.host.clone(),
                    path: internal.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Parse a numeric resource string. Empty or absent values mean "unset".
pub fn parse_resource(field: &'static str, value: Option<&str>) -> ValidationResult<Option<i64>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ValidationError::InvalidResource {
                field,
                value: raw.to_string(),
            }),
    }
}

/// Whether a resource may join a network with the given driver.
///
/// Swarm services and stacks need overlay networks; bridge networks
/// only work for plain compose projects.
pub fn check_driver_compatibility(
    resource: &ResourceSummary,
    network: &Network,
) -> ValidationResult<()> {
    let swarm = resource.is_swarm_workload();
    match (network.driver, swarm) {
        (NetworkDriver::Bridge, true) => Err(ValidationError::IncompatibleDriver {
            network: network.network_name.clone(),
            driver: network.driver.as_str().to_string(),
            workload: "a swarm service".to_string(),
        }),
        (NetworkDriver::Overlay, false) if !network.attachable => {
            Err(ValidationError::IncompatibleDriver {
                network: network.network_name.clone(),
                driver: "non-attachable overlay".to_string(),
                workload: "a compose project".to_string(),
            })
        }
        _ => Ok(()),
    }
}

/// Validate a whole definition before anything is touched.
pub fn validate_definition(def: &ServiceDefinition) -> ValidationResult<()> {
    if def.app_name.trim().is_empty() {
        return Err(ValidationError::MissingField("app_name"));
    }
    if !def
        .app_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(ValidationError::Invalid {
            field: "app_name",
            reason: format!("`{}` contains characters not allowed in a service name", def.app_name),
        });
    }
    validate_domains(&def.app_name, &def.domains)?;
    // A domain may only pick which of the service's networks the proxy uses.
    for domain in &def.domains {
        if let Some(network) = domain.network_id.as_deref() {
            if !def.custom_network_ids.iter().any(|id| id == network) {
                return Err(ValidationError::DomainNetworkNotJoined {
                    app: def.app_name.clone(),
                    host: domain.host.clone(),
                    network: network.to_string(),
                });
            }
        }
    }
    let r = &def.resources;
    parse_resource("memory_limit", r.memory_limit.as_deref())?;
    parse_resource("memory_reservation", r.memory_reservation.as_deref())?;
    parse_resource("cpu_limit", r.cpu_limit.as_deref())?;
    parse_resource("cpu_reservation", r.cpu_reservation.as_deref())?;
    crate::env::prepare_environment(&def.env, &def.project_env)?;
    Ok(())
}
