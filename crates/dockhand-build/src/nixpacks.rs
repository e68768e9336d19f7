//! Nixpacks strategy.
//!
//! With a publish directory the nixpacks image is only a build
//! environment: the artifact is copied out of a throwaway container and
//! wrapped as a static site.

use dockhand_core::ValidationError;
use dockhand_exec::files::quote;

use crate::error::BuildResult;
use crate::plan::{BuildRequest, BuildStep};
use crate::static_site;

pub(crate) fn steps(request: &BuildRequest) -> BuildResult<(Vec<BuildStep>, Vec<String>)> {
    let staging = request.staging_tag();
    let dir = request.build_dir();
    let publish = request
        .settings
        .publish_directory
        .as_deref()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty());

    let mut cmd = format!("nixpacks build {} --name {}", quote(&dir), quote(&staging));
    if request.settings.clean_cache {
        cmd.push_str(" --no-cache");
    }
    if publish.is_some() {
        cmd.push_str(" --no-error-without-start");
    }
    cmd.push_str(&request.env_flags("--env"));

    let mut steps = vec![BuildStep::new("nixpacks build", cmd)];
    let mut cleanup = Vec::new();

    if let Some(publish) = publish {
        if publish.split('/').any(|part| part == "..") {
            return Err(ValidationError::Invalid {
                field: "publish_directory",
                reason: format!("`{publish}` escapes the build directory"),
            }
            .into());
        }
        let container = format!("{}-dockhand-extract", request.app_name);
        let out_dir = format!("{dir}/{publish}");
        steps.push(BuildStep::new(
            "create artifact container",
            format!("docker create --name {} {}", quote(&container), quote(&staging)),
        ));
        steps.push(BuildStep::new(
            "copy artifact",
            format!(
                "rm -rf {out} && mkdir -p {out} && docker cp {}:/app/{publish}/. {out}",
                quote(&container),
                out = quote(&out_dir),
            ),
        ));
        steps.push(BuildStep::new(
            "remove artifact container",
            format!("docker rm {}", quote(&container)),
        ));
        steps.extend(static_site::steps(request, &out_dir));
        cleanup.push(format!("docker rm -f {} >/dev/null 2>&1 || true", quote(&container)));
    }

    Ok((steps, cleanup))
}
