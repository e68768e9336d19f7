//! Input structures consumed by the engine.
//!
//! These are the engine's read-only view of records owned by the
//! surrounding CRUD layer. Each struct lists exactly the fields the
//! engine consumes; nothing here mirrors a persistence schema.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of a `Network` record.
pub type NetworkId = String;

/// Identifier of a remote server entry in `dockhand.toml`.
pub type ServerId = String;

// ── Service definition ─────────────────────────────────────────────

/// Everything needed to build and run one orchestrator service.
///
/// `app_name` is the orchestrator service name; one definition maps to
/// exactly one service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceDefinition {
    pub app_name: String,
    pub source: SourceConfig,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Project-level variables available as `${{project.KEY}}`.
    #[serde(default)]
    pub project_env: BTreeMap<String, String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub mounts: Vec<Mount>,
    #[serde(default)]
    pub resources: ResourceSpec,
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    #[serde(default)]
    pub health_check: Option<HealthCheck>,
    #[serde(default)]
    pub restart_policy: Option<RestartPolicy>,
    #[serde(default)]
    pub placement: Option<Placement>,
    #[serde(default)]
    pub update_config: Option<UpdatePolicy>,
    #[serde(default)]
    pub rollback_config: Option<UpdatePolicy>,
    /// Statically declared service labels. Generated routing labels win
    /// on key collision.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub ports: Vec<PortBinding>,
    #[serde(default)]
    pub custom_network_ids: Vec<NetworkId>,
    #[serde(default)]
    pub domains: Vec<Domain>,
    /// Remote target; `None` means the local host.
    #[serde(default)]
    pub server_id: Option<ServerId>,
    /// Record a rollback version after each successful deployment.
    #[serde(default)]
    pub rollback_active: bool,
}

fn default_replicas() -> u32 {
    1
}

impl ServiceDefinition {
    pub fn has_domains(&self) -> bool {
        !self.domains.is_empty()
    }
}

/// Where the deployed image comes from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Deploy an existing image as-is.
    Image {
        image: String,
        #[serde(default)]
        registry: Option<RegistryAuth>,
    },
    /// Build from the checked-out code under the application directory.
    Build(BuildSettings),
}

/// Credentials for pulling a private image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub registry_url: Option<String>,
}

/// Build backend selection and its options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildSettings {
    pub strategy: BuildStrategy,
    /// Sub-directory of the checked-out code to build from.
    #[serde(default)]
    pub build_path: Option<String>,
    #[serde(default)]
    pub dockerfile: Option<String>,
    #[serde(default)]
    pub docker_context_path: Option<String>,
    #[serde(default)]
    pub docker_build_stage: Option<String>,
    #[serde(default)]
    pub build_args: BTreeMap<String, String>,
    #[serde(default)]
    pub publish_directory: Option<String>,
    #[serde(default)]
    pub is_static_spa: bool,
    #[serde(default)]
    pub clean_cache: bool,
}

/// Build strategies that turn source into an image.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuildStrategy {
    Dockerfile,
    HerokuBuildpacks,
    PaketoBuildpacks,
    Nixpacks,
    Static,
    Railpack,
}

impl BuildStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dockerfile => "dockerfile",
            Self::HerokuBuildpacks => "heroku_buildpacks",
            Self::PaketoBuildpacks => "paketo_buildpacks",
            Self::Nixpacks => "nixpacks",
            Self::Static => "static",
            Self::Railpack => "railpack",
        }
    }
}

impl std::fmt::Display for BuildStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Mounts & resources ─────────────────────────────────────────────

/// A mount attached to the service's containers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mount {
    pub kind: MountKind,
    pub mount_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MountKind {
    /// Engine-managed named volume.
    Volume { volume_name: String },
    /// Host directory bind.
    Bind { host_path: String },
    /// File synthesized under the application's `files/` directory.
    File { file_path: String, content: String },
}

/// Resource limits and reservations as numeric strings
/// (memory in bytes, CPU in nano-CPUs).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceSpec {
    pub memory_limit: Option<String>,
    pub memory_reservation: Option<String>,
    pub cpu_limit: Option<String>,
    pub cpu_reservation: Option<String>,
}

// ── Swarm policies ─────────────────────────────────────────────────

/// Container health check. Durations are nanoseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthCheck {
    pub test: Vec<String>,
    pub interval: Option<i64>,
    pub timeout: Option<i64>,
    pub start_period: Option<i64>,
    pub retries: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestartPolicy {
    pub condition: RestartCondition,
    pub delay: Option<i64>,
    pub max_attempts: Option<i64>,
    pub window: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RestartCondition {
    None,
    OnFailure,
    Any,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Placement {
    #[serde(default)]
    pub constraints: Vec<String>,
    pub max_replicas: Option<i64>,
}

/// Update or rollback behaviour of the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdatePolicy {
    pub parallelism: i64,
    pub order: UpdateOrder,
    pub delay: Option<i64>,
    pub failure_action: Option<FailureAction>,
    pub monitor: Option<i64>,
    pub max_failure_ratio: Option<f64>,
}

impl Default for UpdatePolicy {
    fn default() -> Self {
        Self {
            parallelism: 1,
            order: UpdateOrder::StartFirst,
            delay: None,
            failure_action: None,
            monitor: None,
            max_failure_ratio: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateOrder {
    StartFirst,
    StopFirst,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureAction {
    Continue,
    Pause,
    Rollback,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortBinding {
    pub target_port: u16,
    pub published_port: u16,
    #[serde(default)]
    pub protocol: PortProtocol,
    #[serde(default)]
    pub publish_mode: PublishMode,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PortProtocol {
    #[default]
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PublishMode {
    #[default]
    Ingress,
    Host,
}

// ── Domain ─────────────────────────────────────────────────────────

/// A host/path routed by the reverse proxy to a service port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Domain {
    pub host: String,
    #[serde(default)]
    pub path: Option<String>,
    pub port: u16,
    #[serde(default)]
    pub https: bool,
    #[serde(default)]
    pub certificate: CertificateType,
    #[serde(default)]
    pub strip_path: bool,
    /// Prefix added before forwarding (`addprefix` middleware).
    #[serde(default)]
    pub internal_path: Option<String>,
    /// Unique within the owning definition's domain set.
    pub unique_config_key: String,
    /// Network the proxy should reach this service through.
    #[serde(default)]
    pub network_id: Option<NetworkId>,
}

impl Domain {
    /// The path if it is set and not the root.
    pub fn non_root_path(&self) -> Option<&str> {
        self.path.as_deref().filter(|p| !p.is_empty() && *p != "/")
    }

    /// The prefix to add before forwarding. `/` adds nothing.
    pub fn non_root_internal_path(&self) -> Option<&str> {
        self.internal_path.as_deref().filter(|p| !p.is_empty() && *p != "/")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CertificateType {
    #[default]
    None,
    /// The platform's managed ACME resolver.
    Managed,
    /// An operator-supplied resolver id.
    Custom { resolver: String },
}

// ── Network ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Network {
    pub id: NetworkId,
    /// Display name.
    pub name: String,
    /// Name of the network in the engine.
    pub network_name: String,
    pub driver: NetworkDriver,
    #[serde(default)]
    pub subnet: Option<String>,
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default)]
    pub ip_range: Option<String>,
    #[serde(default)]
    pub internal: bool,
    #[serde(default = "default_true")]
    pub attachable: bool,
    pub organization_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub server_id: Option<ServerId>,
    /// Engine-side id, filled once the network exists.
    #[serde(default)]
    pub docker_network_id: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NetworkDriver {
    Overlay,
    Bridge,
}

impl NetworkDriver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overlay => "overlay",
            Self::Bridge => "bridge",
        }
    }
}

// ── Resources (for reference scans) ────────────────────────────────

/// Category of a deployable resource.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Application,
    Compose,
    Postgres,
    Mysql,
    Mariadb,
    Mongo,
    Redis,
}

impl ResourceKind {
    /// Application-like services and compose stacks can carry domains.
    pub fn carries_domains(&self) -> bool {
        matches!(self, Self::Application | Self::Compose)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ComposeType {
    DockerCompose,
    Stack,
}

/// Network membership and domain count of one resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceSummary {
    pub id: String,
    pub kind: ResourceKind,
    #[serde(default)]
    pub compose_type: Option<ComposeType>,
    #[serde(default)]
    pub custom_network_ids: Vec<NetworkId>,
    #[serde(default)]
    pub domain_count: usize,
    #[serde(default)]
    pub server_id: Option<ServerId>,
}

impl ResourceSummary {
    /// Summary of an application-kind definition.
    pub fn from_definition(def: &ServiceDefinition) -> Self {
        Self {
            id: def.app_name.clone(),
            kind: ResourceKind::Application,
            compose_type: None,
            custom_network_ids: def.custom_network_ids.clone(),
            domain_count: def.domains.len(),
            server_id: def.server_id.clone(),
        }
    }

    pub fn references(&self, network_id: &str) -> bool {
        self.custom_network_ids.iter().any(|id| id == network_id)
    }

    /// Whether the proxy must reach this resource over `network_id`.
    pub fn needs_proxy_on(&self, network_id: &str) -> bool {
        self.kind.carries_domains() && self.domain_count > 0 && self.references(network_id)
    }

    /// Whether this resource runs as swarm services (overlay only).
    pub fn is_swarm_workload(&self) -> bool {
        match self.kind {
            ResourceKind::Compose => self.compose_type == Some(ComposeType::Stack),
            _ => true,
        }
    }
}

// ── Records written by the engine ──────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Running,
    Done,
    Error,
}

/// One deployment attempt of a service definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentRecord {
    pub id: String,
    pub app_name: String,
    pub title: String,
    pub status: DeploymentStatus,
    #[serde(default)]
    pub image: Option<String>,
    pub log_path: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub rollback_version: Option<u32>,
    /// Unix timestamp (seconds).
    pub created_at: u64,
    #[serde(default)]
    pub finished_at: Option<u64>,
}

/// A frozen image + configuration that can be redeployed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RollbackRecord {
    pub app_name: String,
    pub deployment_id: String,
    pub version: u32,
    /// `{app_name}:v{version}`.
    pub image: String,
    /// Resolved `KEY=VALUE` environment at deploy time.
    pub env: Vec<String>,
    /// The definition as it was deployed.
    pub definition: ServiceDefinition,
    pub created_at: u64,
}

/// Tag under which a rollback version of `app_name` is frozen.
pub fn rollback_tag(app_name: &str, version: u32) -> String {
    format!("{app_name}:v{version}")
}
