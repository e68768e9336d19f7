//! Container engine access.
//!
//! [`Engine`] is the seam between orchestration logic and the Docker
//! API. [`DockerEngine`] talks to the engine socket with bollard; for
//! remote targets it opens an `ssh -L` unix-socket tunnel per call and
//! tears it down when the call completes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::container::InspectContainerOptions;
use bollard::errors::Error as BollardError;
use bollard::image::{CreateImageOptions, RemoveImageOptions, TagImageOptions};
use bollard::models::{EndpointSettings, Ipam, IpamConfig, ServiceSpec};
use bollard::network::{
    ConnectNetworkOptions, CreateNetworkOptions, DisconnectNetworkOptions, InspectNetworkOptions,
};
use bollard::service::{InspectServiceOptions, UpdateServiceOptions};
use bollard::{API_DEFAULT_VERSION, Docker};
use dockhand_core::{EngineConfig, RegistryAuth};
use futures_util::TryStreamExt;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::context::{ExecutionContext, RemoteHost};
use crate::error::{ExecError, ExecResult};

// ── Engine-neutral values ──────────────────────────────────────────

/// Result of looking a service up by name.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceProbe {
    Found(ServiceState),
    NotFound,
}

/// What the engine currently holds for a service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceState {
    pub id: Option<String>,
    /// Version index to carry on the next update.
    pub version: u64,
    pub spec: ServiceSpec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
    pub server_address: Option<String>,
}

impl From<&RegistryAuth> for RegistryCredentials {
    fn from(auth: &RegistryAuth) -> Self {
        Self {
            username: auth.username.clone(),
            password: auth.password.clone(),
            server_address: auth.registry_url.clone(),
        }
    }
}

impl From<&RegistryCredentials> for DockerCredentials {
    fn from(creds: &RegistryCredentials) -> Self {
        DockerCredentials {
            username: Some(creds.username.clone()),
            password: Some(creds.password.clone()),
            serveraddress: creds.server_address.clone(),
            ..Default::default()
        }
    }
}

/// Parameters for creating an engine network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkCreateRequest {
    pub name: String,
    pub driver: String,
    pub internal: bool,
    pub attachable: bool,
    pub subnet: Option<String>,
    pub gateway: Option<String>,
    pub ip_range: Option<String>,
    pub labels: HashMap<String, String>,
}

/// Live view of an engine network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkInfo {
    pub id: String,
    pub name: String,
    pub driver: Option<String>,
    pub internal: bool,
    /// Ids of containers with an endpoint on this network.
    pub containers: Vec<String>,
}

impl NetworkInfo {
    pub fn has_endpoints(&self) -> bool {
        !self.containers.is_empty()
    }
}

/// Split `repo[:tag]` into repository and tag, defaulting to `latest`.
/// A colon before the last `/` belongs to a registry port.
pub fn split_image_ref(reference: &str) -> (&str, &str) {
    let slash = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
    match reference[slash..].rfind(':') {
        Some(i) => (&reference[..slash + i], &reference[slash + i + 1..]),
        None => (reference, "latest"),
    }
}

// ── Trait ──────────────────────────────────────────────────────────

#[async_trait]
pub trait Engine: Send + Sync {
    async fn inspect_service(&self, ctx: &ExecutionContext, name: &str) -> ExecResult<ServiceProbe>;

    async fn create_service(
        &self,
        ctx: &ExecutionContext,
        spec: ServiceSpec,
        credentials: Option<&RegistryCredentials>,
    ) -> ExecResult<()>;

    /// Replace a service spec. `version` must be the index last observed
    /// by `inspect_service`; a stale index yields `Conflict`.
    async fn update_service(
        &self,
        ctx: &ExecutionContext,
        name: &str,
        version: u64,
        spec: ServiceSpec,
        credentials: Option<&RegistryCredentials>,
    ) -> ExecResult<()>;

    async fn inspect_network(&self, ctx: &ExecutionContext, name: &str) -> ExecResult<Option<NetworkInfo>>;

    async fn create_network(&self, ctx: &ExecutionContext, request: &NetworkCreateRequest) -> ExecResult<()>;

    async fn remove_network(&self, ctx: &ExecutionContext, name: &str) -> ExecResult<()>;

    async fn connect_container(&self, ctx: &ExecutionContext, network: &str, container: &str) -> ExecResult<()>;

    async fn disconnect_container(&self, ctx: &ExecutionContext, network: &str, container: &str) -> ExecResult<()>;

    /// Names of the networks a container is attached to, `None` if the
    /// container does not exist.
    async fn container_networks(&self, ctx: &ExecutionContext, container: &str) -> ExecResult<Option<Vec<String>>>;

    async fn pull_image(
        &self,
        ctx: &ExecutionContext,
        image: &str,
        credentials: Option<&RegistryCredentials>,
    ) -> ExecResult<()>;

    /// Tag `source` as `target` (`repo[:tag]`).
    async fn tag_image(&self, ctx: &ExecutionContext, source: &str, target: &str) -> ExecResult<()>;

    async fn remove_image(&self, ctx: &ExecutionContext, image: &str) -> ExecResult<()>;
}

// ── Docker implementation ──────────────────────────────────────────

/// bollard-backed engine client.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    socket: String,
    timeout_secs: u64,
}

/// Live client plus the tunnel keeping it reachable, if any.
struct Connection {
    docker: Docker,
    target: String,
    _tunnel: Option<Tunnel>,
}

/// `ssh -L` forwarding a local unix socket to the remote engine socket.
struct Tunnel {
    _child: Child,
    socket: PathBuf,
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        // The child is killed on drop; the forwarded socket file is ours.
        let _ = std::fs::remove_file(&self.socket);
    }
}

const TUNNEL_READY_ATTEMPTS: u32 = 50;
const TUNNEL_READY_INTERVAL: Duration = Duration::from_millis(100);

impl DockerEngine {
    pub fn new(socket: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            socket: socket.into(),
            timeout_secs,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.engine.socket.clone(), config.engine.timeout_secs)
    }

    async fn connect(&self, ctx: &ExecutionContext) -> ExecResult<Connection> {
        let target = ctx.to_string();
        match ctx {
            ExecutionContext::Local => {
                let docker = Docker::connect_with_socket(&self.socket, self.timeout_secs, API_DEFAULT_VERSION)
                    .map_err(|e| transport(&target, e))?;
                Ok(Connection {
                    docker,
                    target,
                    _tunnel: None,
                })
            }
            ExecutionContext::Remote(host) => {
                let tunnel = self.open_tunnel(host, &target).await?;
                let path = tunnel.socket.to_string_lossy().into_owned();
                let docker = Docker::connect_with_socket(&path, self.timeout_secs, API_DEFAULT_VERSION)
                    .map_err(|e| transport(&target, e))?;
                Ok(Connection {
                    docker,
                    target,
                    _tunnel: Some(tunnel),
                })
            }
        }
    }

    async fn open_tunnel(&self, host: &RemoteHost, target: &str) -> ExecResult<Tunnel> {
        let socket = std::env::temp_dir().join(format!("dockhand-{}.sock", uuid::Uuid::new_v4()));
        let forward = format!("{}:{}", socket.display(), self.socket);
        let mut child = Command::new("ssh")
            .args(host.ssh_args())
            .args(["-nNT", "-o", "ExitOnForwardFailure=yes", "-o", "StreamLocalBindUnlink=yes"])
            .arg("-L")
            .arg(&forward)
            .arg(host.destination())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::Transport {
                target: target.to_string(),
                message: format!("failed to spawn ssh tunnel: {e}"),
            })?;

        for _ in 0..TUNNEL_READY_ATTEMPTS {
            if tokio::fs::try_exists(&socket).await.unwrap_or(false) {
                debug!(target_host = %target, socket = %socket.display(), "engine tunnel ready");
                return Ok(Tunnel { _child: child, socket });
            }
            if let Some(status) = child.try_wait()? {
                return Err(ExecError::Transport {
                    target: target.to_string(),
                    message: format!("ssh tunnel exited early with {status}"),
                });
            }
            tokio::time::sleep(TUNNEL_READY_INTERVAL).await;
        }
        Err(ExecError::Transport {
            target: target.to_string(),
            message: "timed out waiting for ssh tunnel".to_string(),
        })
    }
}

fn transport(target: &str, err: impl std::fmt::Display) -> ExecError {
    ExecError::Transport {
        target: target.to_string(),
        message: err.to_string(),
    }
}

/// Classify a bollard error for `object` on `target`.
///
/// Only failures to reach or talk to the daemon count as transport
/// errors. A refusal the daemon reports, over HTTP or inside a progress
/// stream, is an engine error; a reply that does not decode is `Decode`.
fn map_engine_err(target: &str, object: &str, err: BollardError) -> ExecError {
    match err {
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => match status_code {
            404 => ExecError::NotFound(object.to_string()),
            409 => ExecError::Conflict(format!("{object}: {message}")),
            _ if message.contains("update out of sequence") => {
                ExecError::Conflict(format!("{object}: {message}"))
            }
            _ => ExecError::Engine {
                status: status_code,
                message,
            },
        },
        BollardError::DockerStreamError { error } => ExecError::Rejected {
            object: object.to_string(),
            message: error,
        },
        e @ (BollardError::JsonDataError { .. } | BollardError::JsonSerdeError { .. }) => {
            ExecError::Decode {
                object: object.to_string(),
                message: e.to_string(),
            }
        }
        other => transport(target, other),
    }
}

#[async_trait]
impl Engine for DockerEngine {
    async fn inspect_service(&self, ctx: &ExecutionContext, name: &str) -> ExecResult<ServiceProbe> {
        let conn = self.connect(ctx).await?;
        let options = InspectServiceOptions {
            insert_defaults: false,
        };
        match conn.docker.inspect_service(name, Some(options)).await {
            Ok(service) => Ok(ServiceProbe::Found(ServiceState {
                id: service.id,
                version: service.version.and_then(|v| v.index).unwrap_or(0),
                spec: service.spec.unwrap_or_default(),
            })),
            Err(e) => match map_engine_err(&conn.target, name, e) {
                ExecError::NotFound(_) => Ok(ServiceProbe::NotFound),
                other => Err(other),
            },
        }
    }

    async fn create_service(
        &self,
        ctx: &ExecutionContext,
        spec: ServiceSpec,
        credentials: Option<&RegistryCredentials>,
    ) -> ExecResult<()> {
        let conn = self.connect(ctx).await?;
        let name = spec.name.clone().unwrap_or_default();
        conn.docker
            .create_service(spec, credentials.map(DockerCredentials::from))
            .await
            .map_err(|e| map_engine_err(&conn.target, &name, e))?;
        info!(service = %name, target_host = %conn.target, "service created");
        Ok(())
    }

    async fn update_service(
        &self,
        ctx: &ExecutionContext,
        name: &str,
        version: u64,
        spec: ServiceSpec,
        credentials: Option<&RegistryCredentials>,
    ) -> ExecResult<()> {
        let conn = self.connect(ctx).await?;
        let options = UpdateServiceOptions {
            version,
            ..Default::default()
        };
        let response = conn
            .docker
            .update_service(name, spec, options, credentials.map(DockerCredentials::from))
            .await
            .map_err(|e| map_engine_err(&conn.target, name, e))?;
        for warning in response.warnings.unwrap_or_default() {
            warn!(service = %name, %warning, "engine warning on update");
        }
        info!(service = %name, version, target_host = %conn.target, "service updated");
        Ok(())
    }

    async fn inspect_network(&self, ctx: &ExecutionContext, name: &str) -> ExecResult<Option<NetworkInfo>> {
        let conn = self.connect(ctx).await?;
        match conn
            .docker
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await
        {
            Ok(net) => Ok(Some(NetworkInfo {
                id: net.id.unwrap_or_default(),
                name: net.name.unwrap_or_else(|| name.to_string()),
                driver: net.driver,
                internal: net.internal.unwrap_or(false),
                containers: net
                    .containers
                    .map(|c| c.into_keys().collect())
                    .unwrap_or_default(),
            })),
            Err(e) => match map_engine_err(&conn.target, name, e) {
                ExecError::NotFound(_) => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn create_network(&self, ctx: &ExecutionContext, request: &NetworkCreateRequest) -> ExecResult<()> {
        let conn = self.connect(ctx).await?;
        let ipam_config = (request.subnet.is_some() || request.gateway.is_some() || request.ip_range.is_some())
            .then(|| {
                vec![IpamConfig {
                    subnet: request.subnet.clone(),
                    gateway: request.gateway.clone(),
                    ip_range: request.ip_range.clone(),
                    ..Default::default()
                }]
            });
        let options = CreateNetworkOptions {
            name: request.name.clone(),
            check_duplicate: true,
            driver: request.driver.clone(),
            internal: request.internal,
            attachable: request.attachable,
            ipam: Ipam {
                config: ipam_config,
                ..Default::default()
            },
            labels: request.labels.clone(),
            ..Default::default()
        };
        conn.docker
            .create_network(options)
            .await
            .map_err(|e| map_engine_err(&conn.target, &request.name, e))?;
        info!(network = %request.name, driver = %request.driver, target_host = %conn.target, "network created");
        Ok(())
    }

    async fn remove_network(&self, ctx: &ExecutionContext, name: &str) -> ExecResult<()> {
        let conn = self.connect(ctx).await?;
        conn.docker
            .remove_network(name)
            .await
            .map_err(|e| map_engine_err(&conn.target, name, e))?;
        info!(network = %name, target_host = %conn.target, "network removed");
        Ok(())
    }

    async fn connect_container(&self, ctx: &ExecutionContext, network: &str, container: &str) -> ExecResult<()> {
        let conn = self.connect(ctx).await?;
        let options = ConnectNetworkOptions {
            container: container.to_string(),
            endpoint_config: EndpointSettings::default(),
        };
        conn.docker
            .connect_network(network, options)
            .await
            .map_err(|e| map_engine_err(&conn.target, network, e))?;
        debug!(%network, %container, "container connected");
        Ok(())
    }

    async fn disconnect_container(&self, ctx: &ExecutionContext, network: &str, container: &str) -> ExecResult<()> {
        let conn = self.connect(ctx).await?;
        let options = DisconnectNetworkOptions {
            container: container.to_string(),
            force: true,
        };
        conn.docker
            .disconnect_network(network, options)
            .await
            .map_err(|e| map_engine_err(&conn.target, network, e))?;
        debug!(%network, %container, "container disconnected");
        Ok(())
    }

    async fn container_networks(&self, ctx: &ExecutionContext, container: &str) -> ExecResult<Option<Vec<String>>> {
        let conn = self.connect(ctx).await?;
        match conn
            .docker
            .inspect_container(container, None::<InspectContainerOptions>)
            .await
        {
            Ok(info) => Ok(Some(
                info.network_settings
                    .and_then(|s| s.networks)
                    .map(|n| n.into_keys().collect())
                    .unwrap_or_default(),
            )),
            Err(e) => match map_engine_err(&conn.target, container, e) {
                ExecError::NotFound(_) => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn pull_image(
        &self,
        ctx: &ExecutionContext,
        image: &str,
        credentials: Option<&RegistryCredentials>,
    ) -> ExecResult<()> {
        let conn = self.connect(ctx).await?;
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        conn.docker
            .create_image(Some(options), None, credentials.map(DockerCredentials::from))
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| map_engine_err(&conn.target, image, e))?;
        info!(%image, target_host = %conn.target, "image pulled");
        Ok(())
    }

    async fn tag_image(&self, ctx: &ExecutionContext, source: &str, target: &str) -> ExecResult<()> {
        let conn = self.connect(ctx).await?;
        let (repo, tag) = split_image_ref(target);
        let options = TagImageOptions {
            repo: repo.to_string(),
            tag: tag.to_string(),
        };
        conn.docker
            .tag_image(source, Some(options))
            .await
            .map_err(|e| map_engine_err(&conn.target, source, e))?;
        debug!(%source, %target, "image tagged");
        Ok(())
    }

    async fn remove_image(&self, ctx: &ExecutionContext, image: &str) -> ExecResult<()> {
        let conn = self.connect(ctx).await?;
        let options = RemoveImageOptions {
            force: true,
            ..Default::default()
        };
        conn.docker
            .remove_image(image, Some(options), None)
            .await
            .map_err(|e| map_engine_err(&conn.target, image, e))?;
        debug!(%image, "image removed");
        Ok(())
    }
}
