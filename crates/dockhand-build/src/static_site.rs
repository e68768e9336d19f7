//! Static site strategy: serve a directory with nginx.

use dockhand_exec::files::create_file_command;

use crate::dockerfile;
use crate::plan::{BuildRequest, BuildStep};

const SPA_NGINX_CONF: &str = r#"events {
    worker_connections 1024;
}

http {
    include /etc/nginx/mime.types;
    default_type application/octet-stream;

    server {
        listen 80;
        root /usr/share/nginx/html;
        index index.html;

        location / {
            try_files $uri $uri/ /index.html;
        }
    }
}
"#;

fn dockerfile_contents(base_image: &str, spa: bool) -> String {
    let mut out = format!("FROM {base_image}\nWORKDIR /usr/share/nginx/html/\n");
    if spa {
        out.push_str("COPY nginx.conf /etc/nginx/nginx.conf\n");
    }
    out.push_str("COPY . .\nCMD [\"nginx\", \"-g\", \"daemon off;\"]\n");
    out
}

/// Wrap `dir` into an nginx image under the staging tag.
pub(crate) fn steps(request: &BuildRequest, dir: &str) -> Vec<BuildStep> {
    let spa = request.settings.is_static_spa;
    let mut steps = Vec::new();
    if spa {
        steps.push(BuildStep::new(
            "write nginx.conf",
            create_file_command(&format!("{dir}/nginx.conf"), SPA_NGINX_CONF.as_bytes()),
        ));
    }
    steps.push(BuildStep::new(
        "write .dockerignore",
        create_file_command(
            &format!("{dir}/.dockerignore"),
            b"Dockerfile\n.dockerignore\n",
        ),
    ));
    steps.push(BuildStep::new(
        "write Dockerfile",
        create_file_command(
            &format!("{dir}/Dockerfile"),
            dockerfile_contents(&request.tools.static_base_image, spa).as_bytes(),
        ),
    ));

    // The synthesized Dockerfile has no stages or build args.
    let mut plain = request.clone();
    plain.settings.docker_build_stage = None;
    plain.settings.build_args.clear();
    steps.push(dockerfile::build_step(&plain, dir, "Dockerfile", "."));
    steps
}
