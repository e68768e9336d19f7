//! `docker build` strategy.

use dockhand_exec::files::quote;

use crate::plan::{BuildRequest, BuildStep, build_arg_pairs, flag_pairs};

/// Build with `dockerfile` (relative to `dir`) and `context`.
pub(crate) fn build_step(
    request: &BuildRequest,
    dir: &str,
    dockerfile: &str,
    context: &str,
) -> BuildStep {
    let settings = &request.settings;
    let mut cmd = format!(
        "docker build -t {} -f {}",
        quote(&request.staging_tag()),
        quote(dockerfile)
    );
    if let Some(stage) = settings.docker_build_stage.as_deref().filter(|s| !s.is_empty()) {
        cmd.push_str(&format!(" --target {}", quote(stage)));
    }
    if settings.clean_cache {
        cmd.push_str(" --no-cache");
    }
    let args = build_arg_pairs(&settings.build_args);
    cmd.push_str(&flag_pairs("--build-arg", args.iter().map(String::as_str)));
    cmd.push(' ');
    cmd.push_str(&quote(context));
    BuildStep::in_dir("docker build", dir, cmd)
}

pub(crate) fn steps(request: &BuildRequest) -> Vec<BuildStep> {
    let settings = &request.settings;
    let dockerfile = settings.dockerfile.as_deref().unwrap_or("Dockerfile");
    let context = settings.docker_context_path.as_deref().unwrap_or(".");
    vec![build_step(request, &request.build_dir(), dockerfile, context)]
}
