//! The deploy pipeline.
//!
//! Everything that can be checked without touching the target (domain
//! rules, env references, resources, network drivers) runs before the
//! deployment record is created. From then on stages run in order and
//! the first failure marks the record `error`, appends a terminal block
//! to the deployment log and leaves the running service as it was.

use std::sync::Arc;

use bollard::models::ServiceSpec;
use dockhand_build::{BuildJob, Builder, JobSource};
use dockhand_core::env::prepare_environment;
use dockhand_core::validate::validate_definition;
use dockhand_core::{
    AppPaths, DeploymentRecord, DeploymentStatus, EngineConfig, MountKind, ResourceSummary,
    RollbackRecord, RoutingProvider, ServiceDefinition, epoch_secs,
};
use dockhand_exec::files::{append_file_command, create_file_command};
use dockhand_exec::{Engine, ExecutionContext, RegistryCredentials, Shell};
use dockhand_proxy::{ConnectivityManager, DynamicConfigFiles, NetworkManager};
use dockhand_state::StateStore;
use tracing::{debug, info, warn};

use crate::apply::{ApplyOutcome, apply};
use crate::error::DeployResult;
use crate::render::SpecRenderer;
use crate::rollback::RollbackManager;

/// Wires the build, spec, proxy and rollback components to one store
/// and one pair of gateways.
pub struct Deployer {
    config: EngineConfig,
    store: StateStore,
    shell: Arc<dyn Shell>,
    engine: Arc<dyn Engine>,
    paths: AppPaths,
    builder: Builder,
    renderer: SpecRenderer,
    rollbacks: RollbackManager,
    connectivity: Arc<ConnectivityManager>,
    dynamic: DynamicConfigFiles,
}

/// Per-run values shared by the stages.
struct Run<'a> {
    ctx: ExecutionContext,
    id: String,
    log_path: String,
    def: &'a ServiceDefinition,
    env: Vec<String>,
}

impl Deployer {
    pub fn new(config: EngineConfig, store: StateStore, shell: Arc<dyn Shell>, engine: Arc<dyn Engine>) -> Self {
        let paths = config.paths();
        let renderer = SpecRenderer::new(config.clone(), store.clone());
        let rollbacks = RollbackManager::new(engine.clone(), store.clone(), renderer.clone(), paths.clone());
        let connectivity = Arc::new(ConnectivityManager::new(
            engine.clone(),
            store.clone(),
            config.proxy.clone(),
        ));
        let dynamic = DynamicConfigFiles::new(shell.clone(), paths.clone(), config.proxy.clone());
        Self {
            builder: Builder::new(shell.clone(), engine.clone()),
            config,
            store,
            shell,
            engine,
            paths,
            renderer,
            rollbacks,
            connectivity,
            dynamic,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn renderer(&self) -> &SpecRenderer {
        &self.renderer
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityManager> {
        &self.connectivity
    }

    pub fn dynamic_config(&self) -> &DynamicConfigFiles {
        &self.dynamic
    }

    /// Network lifecycle sharing this deployer's lock table.
    pub fn networks(&self) -> NetworkManager {
        NetworkManager::new(
            self.engine.clone(),
            self.store.clone(),
            self.connectivity.clone(),
            self.config.proxy.default_network.clone(),
        )
    }

    /// Execution context for `server_id` (local when `None`).
    pub fn context(&self, server_id: Option<&str>) -> DeployResult<ExecutionContext> {
        Ok(ExecutionContext::resolve(&self.config, server_id)?)
    }

    // ── Deploy ─────────────────────────────────────────────────────

    /// Build (or pull) and roll out `def`. Returns the finished
    /// deployment record; on failure the record is marked `error`
    /// before the error is returned.
    pub async fn deploy(&self, def: &ServiceDefinition, title: &str) -> DeployResult<DeploymentRecord> {
        validate_definition(def)?;
        let ctx = self.context(def.server_id.as_deref())?;
        let env = prepare_environment(&def.env, &def.project_env)?;
        let mut job = BuildJob::from_definition(def, env.clone(), &self.paths, &self.config.build)?;
        let (image, credentials) = match &job.source {
            JobSource::Passthrough { image, credentials } => (image.clone(), credentials.clone()),
            JobSource::Plan(_) => (job.target_tag.clone(), None),
        };
        // Rendering validates networks and routing before anything changes.
        let spec = self.renderer.render(def, &image, &env)?;

        let id = uuid::Uuid::new_v4().to_string();
        let run = Run {
            log_path: self.paths.deployment_log(&def.app_name, &id),
            id,
            ctx,
            def,
            env,
        };
        self.store.put_deployment(&DeploymentRecord {
            id: run.id.clone(),
            app_name: def.app_name.clone(),
            title: title.to_string(),
            status: DeploymentStatus::Running,
            image: Some(image.clone()),
            log_path: run.log_path.clone(),
            error: None,
            rollback_version: None,
            created_at: epoch_secs(),
            finished_at: None,
        })?;
        info!(
            app = %def.app_name,
            deployment = %run.id,
            strategy = job.strategy_name(),
            target_host = %run.ctx,
            "deployment started"
        );

        match self
            .run_stages(&run, &mut job, &image, spec, credentials.as_ref())
            .await
        {
            Ok(record) => {
                self.log(&run, &format!("Deployment {} done\n", run.id)).await;
                info!(app = %def.app_name, deployment = %run.id, "deployment done");
                Ok(record)
            }
            Err(e) => {
                self.fail(&run, &e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        run: &Run<'_>,
        job: &mut BuildJob,
        image: &str,
        spec: ServiceSpec,
        credentials: Option<&RegistryCredentials>,
    ) -> DeployResult<DeploymentRecord> {
        let def = run.def;
        self.shell
            .exec_checked(
                &run.ctx,
                &create_file_command(
                    &run.log_path,
                    format!("Deploying {} ({})\n", def.app_name, job.strategy_name()).as_bytes(),
                ),
            )
            .await?;

        self.write_file_mounts(run).await?;

        let built = self.builder.run(&run.ctx, job, Some(&run.log_path)).await?;
        debug!(app = %def.app_name, image = %built, "image ready");

        if self.config.proxy.provider == RoutingProvider::File {
            self.dynamic
                .sync_domains(&run.ctx, &def.app_name, &def.domains)
                .await?;
        }

        let summary = ResourceSummary::from_definition(def);
        let previous = self.store.get_resource(&summary.id)?;
        let attached = self.connectivity.attach_for_resource(&run.ctx, &summary).await?;
        if !attached.is_empty() {
            self.log(run, &format!("Proxy attached to {}\n", attached.join(", ")))
                .await;
        }

        let outcome = apply(self.engine.as_ref(), &run.ctx, spec, credentials).await?;
        let verb = match outcome {
            ApplyOutcome::Created => "created",
            ApplyOutcome::Updated { .. } => "updated",
        };
        self.log(run, &format!("Service {} {verb}\n", def.app_name)).await;

        // The stored summary only ever describes what is actually running.
        self.store.put_resource(&summary)?;
        if let Some(previous) = previous {
            self.release_dropped_networks(run, &previous, &summary).await;
        }

        if def.rollback_active {
            self.rollbacks
                .record(&run.ctx, &run.id, def, image, &run.env)
                .await
        } else {
            Ok(self
                .store
                .finish_deployment(&run.id, DeploymentStatus::Done, None, None)?)
        }
    }

    /// Detach the proxy from networks the previous rollout needed it on
    /// and this one no longer does, once nothing else references them.
    /// Failures are logged; `reconcile` repairs whatever is left behind.
    async fn release_dropped_networks(
        &self,
        run: &Run<'_>,
        previous: &ResourceSummary,
        current: &ResourceSummary,
    ) {
        let dropped: Vec<&String> = previous
            .custom_network_ids
            .iter()
            .filter(|id| previous.needs_proxy_on(id))
            .filter(|id| previous.server_id != current.server_id || !current.needs_proxy_on(id))
            .collect();
        if dropped.is_empty() {
            return;
        }
        let ctx = if previous.server_id == current.server_id {
            run.ctx.clone()
        } else {
            match self.context(previous.server_id.as_deref()) {
                Ok(ctx) => ctx,
                Err(e) => {
                    warn!(app = %run.def.app_name, error = %e, "previous server unavailable, proxy not released");
                    return;
                }
            }
        };
        for network_id in dropped {
            match self.connectivity.release_network(&ctx, network_id).await {
                Ok(true) => {
                    self.log(run, &format!("Proxy detached from {network_id}\n")).await;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(app = %run.def.app_name, network = %network_id, error = %e, "failed to release proxy network");
                }
            }
        }
    }

    async fn write_file_mounts(&self, run: &Run<'_>) -> DeployResult<()> {
        for mount in &run.def.mounts {
            if let MountKind::File { file_path, content } = &mount.kind {
                let path = self.paths.file_mount_source(&run.def.app_name, file_path);
                self.shell
                    .exec_checked(&run.ctx, &create_file_command(&path, content.as_bytes()))
                    .await?;
                debug!(app = %run.def.app_name, %path, "file mount written");
            }
        }
        Ok(())
    }

    /// Best-effort append to the deployment log.
    async fn log(&self, run: &Run<'_>, line: &str) {
        let command = append_file_command(&run.log_path, line.as_bytes());
        if let Err(e) = self.shell.exec_checked(&run.ctx, &command).await {
            debug!(log = %run.log_path, error = %e, "deployment log not written");
        }
    }

    async fn fail(&self, run: &Run<'_>, message: &str) {
        warn!(app = %run.def.app_name, deployment = %run.id, error = %message, "deployment failed");
        self.log(
            run,
            &format!(
                "\n==================== ERROR ====================\n{message}\n===============================================\n"
            ),
        )
        .await;
        if let Err(e) = self.store.finish_deployment(
            &run.id,
            DeploymentStatus::Error,
            Some(message.to_string()),
            None,
        ) {
            warn!(deployment = %run.id, error = %e, "failed to mark deployment as error");
        }
    }

    // ── Rollback ───────────────────────────────────────────────────

    /// Re-apply snapshot `version` of `app_name` on the server it was
    /// deployed to.
    pub async fn rollback(&self, app_name: &str, version: u32) -> DeployResult<DeploymentRecord> {
        let ctx = self.snapshot_context(app_name, version)?;
        self.rollbacks.rollback(&ctx, app_name, version).await
    }

    pub fn list_rollbacks(&self, app_name: &str) -> DeployResult<Vec<RollbackRecord>> {
        self.rollbacks.list(app_name)
    }

    pub async fn delete_rollback(&self, app_name: &str, version: u32) -> DeployResult<()> {
        let ctx = self.snapshot_context(app_name, version)?;
        self.rollbacks.delete(&ctx, app_name, version).await
    }

    fn snapshot_context(&self, app_name: &str, version: u32) -> DeployResult<ExecutionContext> {
        let server = self
            .store
            .get_rollback(app_name, version)?
            .and_then(|r| r.definition.server_id);
        self.context(server.as_deref())
    }

    pub fn deployments(&self, app_name: &str) -> DeployResult<Vec<DeploymentRecord>> {
        Ok(self.store.list_deployments_for_app(app_name)?)
    }
}
