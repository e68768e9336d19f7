//! Build planning: turn a request into an ordered list of shell steps.
//!
//! Planning is pure. Nothing here touches a host; [`crate::Builder`]
//! executes the plan.

use std::collections::BTreeMap;

use dockhand_core::config::BuildConfig;
use dockhand_core::{AppPaths, BuildSettings, BuildStrategy, ValidationError, env};
use dockhand_exec::files::{create_file_command, quote};
use tracing::debug;

use crate::error::BuildResult;
use crate::{buildpacks, dockerfile, nixpacks, railpack, static_site};

/// Everything a strategy needs to compose its steps.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub app_name: String,
    pub settings: BuildSettings,
    /// Prepared `KEY=VALUE` environment.
    pub env: Vec<String>,
    pub paths: AppPaths,
    pub tools: BuildConfig,
}

impl BuildRequest {
    /// Directory the build tool runs against.
    pub fn build_dir(&self) -> String {
        let code = self.paths.code_dir(&self.app_name);
        match self
            .settings
            .build_path
            .as_deref()
            .map(|p| p.trim_matches('/'))
            .filter(|p| !p.is_empty() && *p != ".")
        {
            Some(sub) => format!("{code}/{sub}"),
            None => code,
        }
    }

    /// Tag every strategy builds into before promotion.
    pub fn staging_tag(&self) -> String {
        staging_tag(&self.app_name)
    }

    pub fn target_tag(&self) -> String {
        format!("{}:latest", self.app_name)
    }

    /// `--{flag} KEY=VALUE` pairs for every prepared variable.
    pub(crate) fn env_flags(&self, flag: &str) -> String {
        flag_pairs(flag, self.env.iter().map(String::as_str))
    }
}

pub fn staging_tag(app_name: &str) -> String {
    format!("{app_name}:dockhand-build")
}

pub(crate) fn flag_pairs<'a>(flag: &str, pairs: impl Iterator<Item = &'a str>) -> String {
    pairs
        .map(|pair| format!(" {flag} {}", quote(pair)))
        .collect()
}

pub(crate) fn build_arg_pairs(args: &BTreeMap<String, String>) -> Vec<String> {
    args.iter().map(|(k, v)| format!("{k}={v}")).collect()
}

/// One shell command of a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStep {
    pub name: String,
    pub command: String,
}

impl BuildStep {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }

    /// Run `command` from inside `dir`.
    pub fn in_dir(name: impl Into<String>, dir: &str, command: impl AsRef<str>) -> Self {
        Self::new(name, format!("cd {} && {}", quote(dir), command.as_ref()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    pub strategy: BuildStrategy,
    pub staging_tag: String,
    pub target_tag: String,
    pub steps: Vec<BuildStep>,
    /// Best-effort commands run when any step fails.
    pub cleanup: Vec<String>,
}

/// Compose the steps of the selected strategy.
pub fn plan(request: &BuildRequest) -> BuildResult<BuildPlan> {
    if request.app_name.trim().is_empty() {
        return Err(ValidationError::MissingField("app_name").into());
    }

    let env_file = request.paths.env_file(&request.app_name);
    let mut steps = vec![BuildStep::new(
        "write environment",
        create_file_command(&env_file, env::to_env_file(&request.env).as_bytes()),
    )];
    let mut cleanup = Vec::new();

    let strategy = request.settings.strategy;
    match strategy {
        BuildStrategy::Dockerfile => steps.extend(dockerfile::steps(request)),
        BuildStrategy::HerokuBuildpacks => {
            steps.extend(buildpacks::steps(request, &request.tools.heroku_builder))
        }
        BuildStrategy::PaketoBuildpacks => {
            steps.extend(buildpacks::steps(request, &request.tools.paketo_builder))
        }
        BuildStrategy::Nixpacks => {
            let (nix_steps, nix_cleanup) = nixpacks::steps(request)?;
            steps.extend(nix_steps);
            cleanup.extend(nix_cleanup);
        }
        BuildStrategy::Static => steps.extend(static_site::steps(request, &request.build_dir())),
        BuildStrategy::Railpack => steps.extend(railpack::steps(request)),
    }

    debug!(
        app = %request.app_name,
        %strategy,
        steps = steps.len(),
        "build planned"
    );

    Ok(BuildPlan {
        strategy,
        staging_tag: request.staging_tag(),
        target_tag: request.target_tag(),
        steps,
        cleanup,
    })
}
