//! Build execution.
//!
//! A job is terminal once it has either produced `{app}:latest` or
//! failed. On failure the staging tag and any throwaway containers are
//! removed and `latest` is left untouched.

use std::sync::Arc;

use dockhand_core::config::BuildConfig;
use dockhand_core::{AppPaths, BuildStrategy, ServiceDefinition, SourceConfig};
use dockhand_exec::files::quote;
use dockhand_exec::{Engine, ExecutionContext, RegistryCredentials, Shell};
use tracing::{debug, info, warn};

use crate::error::{BuildError, BuildResult};
use crate::plan::{BuildPlan, BuildRequest, plan, staging_tag};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Where the image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSource {
    /// Pull an existing image and deploy it as-is.
    Passthrough {
        image: String,
        credentials: Option<RegistryCredentials>,
    },
    Plan(BuildPlan),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildJob {
    pub app_name: String,
    pub source: JobSource,
    pub staging_tag: String,
    pub target_tag: String,
    pub status: BuildStatus,
}

impl BuildJob {
    /// Plan the job for a definition. `env` is the prepared environment.
    pub fn from_definition(
        def: &ServiceDefinition,
        env: Vec<String>,
        paths: &AppPaths,
        tools: &BuildConfig,
    ) -> BuildResult<Self> {
        let source = match &def.source {
            SourceConfig::Image { image, registry } => JobSource::Passthrough {
                image: image.clone(),
                credentials: registry.as_ref().map(RegistryCredentials::from),
            },
            SourceConfig::Build(settings) => JobSource::Plan(plan(&BuildRequest {
                app_name: def.app_name.clone(),
                settings: settings.clone(),
                env,
                paths: paths.clone(),
                tools: tools.clone(),
            })?),
        };
        Ok(Self {
            app_name: def.app_name.clone(),
            source,
            staging_tag: staging_tag(&def.app_name),
            target_tag: format!("{}:latest", def.app_name),
            status: BuildStatus::Pending,
        })
    }

    /// `image` for passthrough jobs, the strategy name otherwise.
    pub fn strategy_name(&self) -> &'static str {
        match &self.source {
            JobSource::Passthrough { .. } => "image",
            JobSource::Plan(plan) => plan.strategy.as_str(),
        }
    }

    pub fn strategy(&self) -> Option<BuildStrategy> {
        match &self.source {
            JobSource::Passthrough { .. } => None,
            JobSource::Plan(plan) => Some(plan.strategy),
        }
    }
}

/// Runs build jobs through the execution gateway.
#[derive(Clone)]
pub struct Builder {
    shell: Arc<dyn Shell>,
    engine: Arc<dyn Engine>,
}

impl Builder {
    pub fn new(shell: Arc<dyn Shell>, engine: Arc<dyn Engine>) -> Self {
        Self { shell, engine }
    }

    /// Run `job` to completion and return the image reference to deploy.
    ///
    /// Step output is appended to `log_path` on the target when given.
    pub async fn run(
        &self,
        ctx: &ExecutionContext,
        job: &mut BuildJob,
        log_path: Option<&str>,
    ) -> BuildResult<String> {
        job.status = BuildStatus::Running;
        info!(app = %job.app_name, strategy = job.strategy_name(), target_host = %ctx, "build started");

        let result = match &job.source {
            JobSource::Passthrough { image, credentials } => {
                self.passthrough(ctx, image, credentials.as_ref(), &job.target_tag).await
            }
            JobSource::Plan(plan) => self.run_plan(ctx, plan, log_path).await,
        };

        match &result {
            Ok(image) => {
                job.status = BuildStatus::Succeeded;
                info!(app = %job.app_name, %image, "build succeeded");
            }
            Err(e) => {
                job.status = BuildStatus::Failed;
                warn!(app = %job.app_name, error = %e, "build failed");
            }
        }
        result
    }

    async fn passthrough(
        &self,
        ctx: &ExecutionContext,
        image: &str,
        credentials: Option<&RegistryCredentials>,
        target_tag: &str,
    ) -> BuildResult<String> {
        self.engine.pull_image(ctx, image, credentials).await?;
        self.engine.tag_image(ctx, image, target_tag).await?;
        Ok(image.to_string())
    }

    async fn run_plan(
        &self,
        ctx: &ExecutionContext,
        plan: &BuildPlan,
        log_path: Option<&str>,
    ) -> BuildResult<String> {
        for step in &plan.steps {
            debug!(step = %step.name, "build step");
            let command = match log_path {
                Some(log) => format!("( {} ) >> {} 2>&1", step.command, quote(log)),
                None => step.command.clone(),
            };
            let outcome = self.shell.exec(ctx, &command).await;
            let failure = match outcome {
                Ok(out) if out.success() => None,
                Ok(out) => Some(BuildError::Failed {
                    step: step.name.clone(),
                    code: out.exit_code,
                    detail: match log_path {
                        Some(log) => format!("see {log}"),
                        None => tail(&out.stderr, 20),
                    },
                }),
                Err(e) => Some(e.into()),
            };
            if let Some(err) = failure {
                self.compensate(ctx, plan).await;
                return Err(err);
            }
        }

        self.engine
            .tag_image(ctx, &plan.staging_tag, &plan.target_tag)
            .await?;
        if let Err(e) = self.engine.remove_image(ctx, &plan.staging_tag).await {
            debug!(tag = %plan.staging_tag, error = %e, "staging tag not removed");
        }
        Ok(plan.target_tag.clone())
    }

    async fn compensate(&self, ctx: &ExecutionContext, plan: &BuildPlan) {
        for command in &plan.cleanup {
            if let Err(e) = self.shell.exec(ctx, command).await {
                debug!(%command, error = %e, "cleanup command failed");
            }
        }
        if let Err(e) = self.engine.remove_image(ctx, &plan.staging_tag).await {
            debug!(tag = %plan.staging_tag, error = %e, "staging tag not removed");
        }
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim_end().lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
