//! Create-or-update of a service spec.

use bollard::models::ServiceSpec;
use dockhand_exec::{Engine, ExecutionContext, RegistryCredentials, ServiceProbe};
use tracing::info;

use crate::error::DeployResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated { previous_version: u64 },
}

/// Apply `spec` to the engine: create the service when absent, otherwise
/// replace it at the observed version index.
///
/// Updates always bump the task template's force counter so tasks are
/// rescheduled even when the spec is unchanged (same `latest` tag, new
/// image). A concurrent writer surfaces as a conflict; it is not retried.
pub async fn apply(
    engine: &dyn Engine,
    ctx: &ExecutionContext,
    mut spec: ServiceSpec,
    credentials: Option<&RegistryCredentials>,
) -> DeployResult<ApplyOutcome> {
    let name = spec.name.clone().unwrap_or_default();
    match engine.inspect_service(ctx, &name).await? {
        ServiceProbe::NotFound => {
            engine.create_service(ctx, spec, credentials).await?;
            info!(service = %name, target_host = %ctx, "service created");
            Ok(ApplyOutcome::Created)
        }
        ServiceProbe::Found(state) => {
            let previous = state
                .spec
                .task_template
                .as_ref()
                .and_then(|t| t.force_update)
                .unwrap_or(0);
            spec.task_template.get_or_insert_with(Default::default).force_update = Some(previous + 1);
            engine
                .update_service(ctx, &name, state.version, spec, credentials)
                .await?;
            info!(service = %name, version = state.version, target_host = %ctx, "service updated");
            Ok(ApplyOutcome::Updated {
                previous_version: state.version,
            })
        }
    }
}
