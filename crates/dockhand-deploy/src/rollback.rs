//! Rollback snapshots.
//!
//! Every successful deployment of a rollback-enabled application keeps
//! its image under `{app}:v{n}` together with the environment and the
//! definition it ran with. Rolling back re-applies that snapshot; it never
//! rebuilds.

use std::sync::Arc;

use dockhand_core::{
    AppPaths, DeploymentRecord, DeploymentStatus, RollbackRecord, ServiceDefinition, epoch_secs,
    rollback_tag,
};
use dockhand_exec::{Engine, ExecutionContext};
use dockhand_state::StateStore;
use tracing::{info, warn};

use crate::apply::apply;
use crate::error::{DeployError, DeployResult};
use crate::render::SpecRenderer;

pub struct RollbackManager {
    engine: Arc<dyn Engine>,
    store: StateStore,
    renderer: SpecRenderer,
    paths: AppPaths,
}

impl RollbackManager {
    pub fn new(engine: Arc<dyn Engine>, store: StateStore, renderer: SpecRenderer, paths: AppPaths) -> Self {
        Self {
            engine,
            store,
            renderer,
            paths,
        }
    }

    /// Snapshot a finished deployment and mark it done.
    ///
    /// The version tag is created first and removed again if the records
    /// cannot be written, so a tag never outlives a failed snapshot.
    pub async fn record(
        &self,
        ctx: &ExecutionContext,
        deployment_id: &str,
        def: &ServiceDefinition,
        image: &str,
        env: &[String],
    ) -> DeployResult<DeploymentRecord> {
        let version = self.store.next_rollback_version(&def.app_name)?;
        let tag = rollback_tag(&def.app_name, version);
        self.engine.tag_image(ctx, image, &tag).await?;

        let snapshot = RollbackRecord {
            app_name: def.app_name.clone(),
            deployment_id: deployment_id.to_string(),
            version,
            image: tag.clone(),
            env: env.to_vec(),
            definition: def.clone(),
            created_at: epoch_secs(),
        };
        match self
            .store
            .finish_deployment(deployment_id, DeploymentStatus::Done, None, Some(&snapshot))
        {
            Ok(record) => {
                info!(app = %def.app_name, version, image = %tag, "rollback snapshot recorded");
                Ok(record)
            }
            Err(e) => {
                if let Err(untag) = self.engine.remove_image(ctx, &tag).await {
                    warn!(image = %tag, error = %untag, "failed to remove orphaned rollback tag");
                }
                Err(e.into())
            }
        }
    }

    pub fn list(&self, app_name: &str) -> DeployResult<Vec<RollbackRecord>> {
        Ok(self.store.list_rollbacks(app_name)?)
    }

    fn load(&self, app_name: &str, version: u32) -> DeployResult<RollbackRecord> {
        self.store
            .get_rollback(app_name, version)?
            .ok_or_else(|| DeployError::RollbackNotFound {
                app: app_name.to_string(),
                version,
            })
    }

    /// Re-apply snapshot `version` of `app_name`.
    ///
    /// The service is rendered from the stored definition, image and
    /// environment, then force-updated. The run is recorded as its own
    /// deployment.
    pub async fn rollback(
        &self,
        ctx: &ExecutionContext,
        app_name: &str,
        version: u32,
    ) -> DeployResult<DeploymentRecord> {
        let snapshot = self.load(app_name, version)?;
        let spec = self
            .renderer
            .render(&snapshot.definition, &snapshot.image, &snapshot.env)?;

        let id = uuid::Uuid::new_v4().to_string();
        self.store.put_deployment(&DeploymentRecord {
            id: id.clone(),
            app_name: app_name.to_string(),
            title: format!("Rollback to v{version}"),
            status: DeploymentStatus::Running,
            image: Some(snapshot.image.clone()),
            log_path: self.paths.deployment_log(app_name, &id),
            error: None,
            rollback_version: None,
            created_at: epoch_secs(),
            finished_at: None,
        })?;

        match apply(self.engine.as_ref(), ctx, spec, None).await {
            Ok(outcome) => {
                info!(app = %app_name, version, ?outcome, "rolled back");
                Ok(self
                    .store
                    .finish_deployment(&id, DeploymentStatus::Done, None, None)?)
            }
            Err(e) => {
                warn!(app = %app_name, version, error = %e, "rollback failed");
                self.store
                    .finish_deployment(&id, DeploymentStatus::Error, Some(e.to_string()), None)?;
                Err(e)
            }
        }
    }

    /// Drop snapshot `version`. Removing the image tag is best effort; the
    /// record is always deleted.
    pub async fn delete(&self, ctx: &ExecutionContext, app_name: &str, version: u32) -> DeployResult<()> {
        let snapshot = self.load(app_name, version)?;
        if let Err(e) = self.engine.remove_image(ctx, &snapshot.image).await {
            warn!(image = %snapshot.image, error = %e, "failed to remove rollback image");
        }
        self.store.delete_rollback(app_name, version)?;
        info!(app = %app_name, version, "rollback snapshot deleted");
        Ok(())
    }
}
