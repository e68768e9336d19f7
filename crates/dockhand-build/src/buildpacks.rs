//! Cloud Native Buildpacks via `pack build`.
//!
//! Heroku and Paketo differ only in the builder image.

use dockhand_exec::files::quote;

use crate::plan::{BuildRequest, BuildStep};

pub(crate) fn steps(request: &BuildRequest, builder: &str) -> Vec<BuildStep> {
    let mut cmd = format!(
        "pack build {} --path {} --builder {}",
        quote(&request.staging_tag()),
        quote(&request.build_dir()),
        quote(builder)
    );
    if request.settings.clean_cache {
        cmd.push_str(" --clear-cache");
    }
    cmd.push_str(&request.env_flags("--env"));
    vec![BuildStep::new("pack build", cmd)]
}
