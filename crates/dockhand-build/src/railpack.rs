//! Railpack strategy: `railpack prepare` writes a build plan, a BuildKit
//! frontend turns it into an image.

use dockhand_exec::files::quote;

use crate::plan::{BuildRequest, BuildStep, flag_pairs};

const BUILDER_NAME: &str = "dockhand-railpack";

pub(crate) fn steps(request: &BuildRequest) -> Vec<BuildStep> {
    let dir = request.build_dir();
    let plan_file = format!("{dir}/railpack-plan.json");
    let info_file = format!("{dir}/railpack-info.json");

    let prepare = format!(
        "railpack prepare {} --plan-out {} --info-out {}{}",
        quote(&dir),
        quote(&plan_file),
        quote(&info_file),
        request.env_flags("--env"),
    );

    let ensure_builder = format!(
        "docker buildx inspect {BUILDER_NAME} >/dev/null 2>&1 || \
         docker buildx create --name {BUILDER_NAME} --driver docker-container"
    );

    // Variables reach the frontend as build secrets read from the environment.
    let exports: String = request
        .env
        .iter()
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| format!("{k}={} ", quote(v)))
        .collect();
    let secret_ids: Vec<String> = request
        .env
        .iter()
        .filter_map(|pair| pair.split_once('=').map(|(k, _)| k))
        .map(|k| format!("id={k},env={k}"))
        .collect();
    let secrets = flag_pairs("--secret", secret_ids.iter().map(String::as_str));
    let mut build = format!(
        "{exports}docker buildx build --builder {BUILDER_NAME} --build-arg BUILDKIT_SYNTAX={} -f {} --output type=docker,name={}",
        quote(&request.tools.railpack_frontend),
        quote(&plan_file),
        quote(&request.staging_tag()),
    );
    if request.settings.clean_cache {
        build.push_str(" --no-cache");
    }
    build.push_str(&secrets);
    build.push(' ');
    build.push_str(&quote(&dir));

    vec![
        BuildStep::new("railpack prepare", prepare),
        BuildStep::new("ensure buildx builder", ensure_builder),
        BuildStep::new("railpack build", build),
    ]
}
