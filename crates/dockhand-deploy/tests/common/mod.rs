//! In-memory engine and shell shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine as _;
use bollard::models::ServiceSpec;
use dockhand_core::{
    CertificateType, Domain, EngineConfig, Network, NetworkDriver, ServiceDefinition, SourceConfig,
};
use dockhand_deploy::Deployer;
use dockhand_exec::{
    Engine, ExecError, ExecOutput, ExecResult, ExecutionContext, NetworkCreateRequest, NetworkInfo,
    RegistryCredentials, ServiceProbe, ServiceState, Shell,
};
use dockhand_state::StateStore;

// ── Engine ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct EngineState {
    pub services: HashMap<String, (u64, ServiceSpec)>,
    pub networks: HashMap<String, NetworkInfo>,
    pub containers: HashMap<String, Vec<String>>,
    pub images: BTreeSet<String>,
    pub calls: Vec<String>,
}

#[derive(Default)]
pub struct FakeEngine {
    pub state: Mutex<EngineState>,
}

impl FakeEngine {
    pub fn service(&self, name: &str) -> Option<(u64, ServiceSpec)> {
        self.state.lock().unwrap().services.get(name).cloned()
    }

    pub fn has_image(&self, image: &str) -> bool {
        self.state.lock().unwrap().images.contains(image)
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn add_image(&self, image: &str) {
        self.state.lock().unwrap().images.insert(image.to_string());
    }

    /// Run the proxy as a plain container.
    pub fn add_proxy_container(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .containers
            .insert(name.to_string(), vec!["dockhand-network".to_string()]);
    }

    /// Run the proxy as a swarm service on the platform network.
    pub fn add_proxy_service(&self, name: &str) {
        let spec = ServiceSpec {
            name: Some(name.to_string()),
            task_template: Some(bollard::models::TaskSpec {
                networks: Some(vec![bollard::models::NetworkAttachmentConfig {
                    target: Some("dockhand-network".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        self.state
            .lock()
            .unwrap()
            .services
            .insert(name.to_string(), (1, spec));
    }

    /// Names of the networks on a service's task template.
    pub fn service_networks(&self, name: &str) -> Vec<String> {
        self.service(name)
            .and_then(|(_, spec)| spec.task_template)
            .and_then(|t| t.networks)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|n| n.target)
            .collect()
    }

    pub fn container_networks_of(&self, name: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Put a workload container on `network` so it reports an endpoint.
    pub fn add_endpoint(&self, network: &str, container: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(info) = state.networks.get_mut(network) {
            info.containers.push(container.to_string());
        }
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn inspect_service(&self, _: &ExecutionContext, name: &str) -> ExecResult<ServiceProbe> {
        Ok(match self.service(name) {
            Some((version, spec)) => ServiceProbe::Found(ServiceState {
                id: Some(format!("svc-{name}")),
                version,
                spec,
            }),
            None => ServiceProbe::NotFound,
        })
    }

    async fn create_service(
        &self,
        _: &ExecutionContext,
        spec: ServiceSpec,
        _: Option<&RegistryCredentials>,
    ) -> ExecResult<()> {
        let mut state = self.state.lock().unwrap();
        let name = spec.name.clone().unwrap_or_default();
        state.calls.push(format!("create_service {name}"));
        if state.services.contains_key(&name) {
            return Err(ExecError::Conflict(format!("service {name} already exists")));
        }
        state.services.insert(name, (1, spec));
        Ok(())
    }

    async fn update_service(
        &self,
        _: &ExecutionContext,
        name: &str,
        version: u64,
        spec: ServiceSpec,
        _: Option<&RegistryCredentials>,
    ) -> ExecResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("update_service {name}@{version}"));
        let entry = state
            .services
            .get_mut(name)
            .ok_or_else(|| ExecError::NotFound(format!("service {name}")))?;
        if entry.0 != version {
            return Err(ExecError::Conflict("update out of sequence".to_string()));
        }
        *entry = (version + 1, spec);
        Ok(())
    }

    async fn inspect_network(&self, _: &ExecutionContext, name: &str) -> ExecResult<Option<NetworkInfo>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .networks
            .get(name)
            .or_else(|| state.networks.values().find(|n| n.id == name))
            .cloned())
    }

    async fn create_network(&self, _: &ExecutionContext, request: &NetworkCreateRequest) -> ExecResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("create_network {}", request.name));
        if state.networks.contains_key(&request.name) {
            return Err(ExecError::Conflict(format!("network {} exists", request.name)));
        }
        state.networks.insert(
            request.name.clone(),
            NetworkInfo {
                id: format!("id-{}", request.name),
                name: request.name.clone(),
                driver: Some(request.driver.clone()),
                internal: request.internal,
                containers: vec![],
            },
        );
        Ok(())
    }

    async fn remove_network(&self, _: &ExecutionContext, name: &str) -> ExecResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("remove_network {name}"));
        match state.networks.get(name) {
            None => Err(ExecError::NotFound(format!("network {name}"))),
            Some(info) if info.has_endpoints() => {
                Err(ExecError::Conflict(format!("network {name} has active endpoints")))
            }
            Some(_) => {
                state.networks.remove(name);
                Ok(())
            }
        }
    }

    async fn connect_container(&self, _: &ExecutionContext, network: &str, container: &str) -> ExecResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("connect {container} {network}"));
        let attached = state
            .containers
            .get_mut(container)
            .ok_or_else(|| ExecError::NotFound(format!("container {container}")))?;
        attached.push(network.to_string());
        if let Some(info) = state.networks.get_mut(network) {
            info.containers.push(container.to_string());
        }
        Ok(())
    }

    async fn disconnect_container(&self, _: &ExecutionContext, network: &str, container: &str) -> ExecResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("disconnect {container} {network}"));
        let attached = state
            .containers
            .get_mut(container)
            .ok_or_else(|| ExecError::NotFound(format!("container {container}")))?;
        attached.retain(|n| n != network);
        if let Some(info) = state.networks.get_mut(network) {
            info.containers.retain(|c| c != container);
        }
        Ok(())
    }

    async fn container_networks(&self, _: &ExecutionContext, container: &str) -> ExecResult<Option<Vec<String>>> {
        Ok(self.state.lock().unwrap().containers.get(container).cloned())
    }

    async fn pull_image(
        &self,
        _: &ExecutionContext,
        image: &str,
        _: Option<&RegistryCredentials>,
    ) -> ExecResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("pull {image}"));
        state.images.insert(image.to_string());
        Ok(())
    }

    async fn tag_image(&self, _: &ExecutionContext, source: &str, target: &str) -> ExecResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("tag {source} {target}"));
        if !state.images.contains(source) {
            return Err(ExecError::NotFound(format!("image {source}")));
        }
        state.images.insert(target.to_string());
        Ok(())
    }

    async fn remove_image(&self, _: &ExecutionContext, image: &str) -> ExecResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("rmi {image}"));
        if state.images.remove(image) {
            Ok(())
        } else {
            Err(ExecError::NotFound(format!("image {image}")))
        }
    }
}

// ── Shell ──────────────────────────────────────────────────────────

/// Understands the gateway's file commands; everything else is recorded
/// and succeeds unless it contains `fail_on`. A `docker build` step
/// produces the staging image in the paired engine.
#[derive(Default)]
pub struct FakeShell {
    pub files: Mutex<BTreeMap<String, String>>,
    pub commands: Mutex<Vec<String>>,
    pub fail_on: Mutex<Option<String>>,
    pub engine: Option<Arc<FakeEngine>>,
}

fn unquote(s: &str) -> String {
    s.trim().trim_matches('\'').to_string()
}

impl FakeShell {
    pub fn with_engine(engine: Arc<FakeEngine>) -> Self {
        Self {
            engine: Some(engine),
            ..Default::default()
        }
    }

    pub fn fail_on(&self, needle: &str) {
        *self.fail_on.lock().unwrap() = Some(needle.to_string());
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    fn write(&self, command: &str) {
        let Some((_, write)) = command.split_once("echo \"") else {
            return;
        };
        let Some((encoded, rest)) = write.split_once('"') else {
            return;
        };
        let Some(target) = rest.rsplit('>').next() else {
            return;
        };
        let path = unquote(target);
        let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
            return;
        };
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let mut files = self.files.lock().unwrap();
        if rest.contains(">>") {
            files.entry(path).or_default().push_str(&text);
        } else {
            files.insert(path, text);
        }
    }
}

#[async_trait]
impl Shell for FakeShell {
    async fn exec(&self, _: &ExecutionContext, command: &str) -> ExecResult<ExecOutput> {
        self.commands.lock().unwrap().push(command.to_string());
        let failing = self
            .fail_on
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|needle| command.contains(needle));
        if failing {
            return Ok(ExecOutput {
                stdout: String::new(),
                stderr: "step failed\n".to_string(),
                exit_code: 1,
            });
        }

        let mut out = ExecOutput::default();
        if command.starts_with("( ") {
            // Build step redirected into the deployment log.
            if command.contains("docker build") {
                if let Some(engine) = &self.engine {
                    if let Some(tag) = command
                        .split_whitespace()
                        .skip_while(|w| *w != "-t")
                        .nth(1)
                    {
                        engine.add_image(&unquote(tag));
                    }
                }
            }
        } else if let Some(rest) = command.strip_prefix("rm -f ") {
            self.files.lock().unwrap().remove(&unquote(rest));
        } else if let Some(rest) = command.strip_prefix("if [ -f ") {
            let path = unquote(rest.split(" ]").next().unwrap_or_default());
            out.stdout = self.file(&path).unwrap_or_default();
        } else {
            self.write(command);
        }
        Ok(out)
    }
}

// ── Fixtures ───────────────────────────────────────────────────────

pub struct Harness {
    pub engine: Arc<FakeEngine>,
    pub shell: Arc<FakeShell>,
    pub store: StateStore,
    pub deployer: Deployer,
}

pub fn make_harness() -> Harness {
    make_harness_with(EngineConfig::default())
}

pub fn make_harness_with(config: EngineConfig) -> Harness {
    let engine = Arc::new(FakeEngine::default());
    let shell = Arc::new(FakeShell::with_engine(engine.clone()));
    let store = StateStore::open_in_memory().unwrap();
    let deployer = Deployer::new(config, store.clone(), shell.clone(), engine.clone());
    Harness {
        engine,
        shell,
        store,
        deployer,
    }
}

pub fn make_definition(app: &str, image: &str) -> ServiceDefinition {
    ServiceDefinition {
        app_name: app.to_string(),
        source: SourceConfig::Image {
            image: image.to_string(),
            registry: None,
        },
        env: BTreeMap::new(),
        project_env: BTreeMap::new(),
        command: None,
        mounts: vec![],
        resources: Default::default(),
        replicas: 1,
        health_check: None,
        restart_policy: None,
        placement: None,
        update_config: None,
        rollback_config: None,
        labels: BTreeMap::new(),
        ports: vec![],
        custom_network_ids: vec![],
        domains: vec![],
        server_id: None,
        rollback_active: false,
    }
}

pub fn make_domain(key: &str, host: &str) -> Domain {
    Domain {
        host: host.to_string(),
        path: None,
        port: 3000,
        https: true,
        certificate: CertificateType::Managed,
        strip_path: false,
        internal_path: None,
        unique_config_key: key.to_string(),
        network_id: None,
    }
}

pub fn make_network(id: &str, internal: bool) -> Network {
    Network {
        id: id.to_string(),
        name: id.to_string(),
        network_name: format!("{id}-net"),
        driver: NetworkDriver::Overlay,
        subnet: None,
        gateway: None,
        ip_range: None,
        internal,
        attachable: true,
        organization_id: "org-1".to_string(),
        project_id: None,
        server_id: None,
        docker_network_id: None,
    }
}

/// Image and env of a service's container spec.
pub fn container_of(spec: &ServiceSpec) -> (String, Vec<String>) {
    let container = spec
        .task_template
        .as_ref()
        .and_then(|t| t.container_spec.as_ref())
        .unwrap();
    (
        container.image.clone().unwrap_or_default(),
        container.env.clone().unwrap_or_default(),
    )
}

pub fn force_update_of(spec: &ServiceSpec) -> Option<i64> {
    spec.task_template.as_ref().and_then(|t| t.force_update)
}
