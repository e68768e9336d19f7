//! On-disk layout shared by every target host.
//!
//! ```text
//! {base}/applications/{app}/code     build context
//! {base}/applications/{app}/files    synthesized file mounts
//! {base}/applications/{app}/.env
//! {base}/logs/{app}/{deployment}.log
//! {base}/traefik/dynamic/{app}.yml   hot-reloaded routing files
//! ```
//!
//! Paths are computed as strings because they are often interpreted on a
//! remote host, not on the machine running the engine.

use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    base: String,
}

impl AppPaths {
    pub fn new(base: &Path) -> Self {
        let base = base.to_string_lossy().trim_end_matches('/').to_string();
        Self { base }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn applications(&self) -> String {
        format!("{}/applications", self.base)
    }

    pub fn app_dir(&self, app: &str) -> String {
        format!("{}/{app}", self.applications())
    }

    pub fn code_dir(&self, app: &str) -> String {
        format!("{}/code", self.app_dir(app))
    }

    pub fn files_dir(&self, app: &str) -> String {
        format!("{}/files", self.app_dir(app))
    }

    /// Host-side source of a synthesized file mount.
    pub fn file_mount_source(&self, app: &str, file_path: &str) -> String {
        format!("{}/{}", self.files_dir(app), file_path.trim_start_matches('/'))
    }

    pub fn env_file(&self, app: &str) -> String {
        format!("{}/.env", self.app_dir(app))
    }

    pub fn logs_dir(&self, app: &str) -> String {
        format!("{}/logs/{app}", self.base)
    }

    pub fn deployment_log(&self, app: &str, deployment_id: &str) -> String {
        format!("{}/{deployment_id}.log", self.logs_dir(app))
    }

    pub fn dynamic_config_dir(&self) -> String {
        format!("{}/traefik/dynamic", self.base)
    }

    pub fn dynamic_config(&self, app: &str) -> String {
        format!("{}/{app}.yml", self.dynamic_config_dir())
    }
}
