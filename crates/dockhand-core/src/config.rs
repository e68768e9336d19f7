//! dockhand.toml configuration parser.
//!
//! Every field has a default, so a missing file yields a working
//! configuration for the local host.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::paths::AppPaths;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub paths: PathsConfig,
    pub proxy: ProxyConfig,
    pub build: BuildConfig,
    pub engine: DockerConfig,
    /// Remote targets keyed by server id.
    pub servers: BTreeMap<String, ServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the on-disk layout on every target host.
    pub base_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("/etc/dockhand"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Swarm service name of the reverse proxy.
    pub service_name: String,
    /// Container name used when the proxy does not run as a service.
    pub container_name: String,
    /// Platform network every service joins.
    pub default_network: String,
    /// Resolver name used for managed certificates.
    pub cert_resolver: String,
    pub redirect_middleware: String,
    pub web_entrypoint: String,
    pub websecure_entrypoint: String,
    /// How routing reaches the proxy.
    pub provider: RoutingProvider,
}

/// Routing configuration source for the reverse proxy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoutingProvider {
    /// Labels on the swarm service.
    #[default]
    Labels,
    /// `{app}.yml` files in the proxy's dynamic config directory.
    File,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            service_name: "dockhand-traefik".to_string(),
            container_name: "dockhand-traefik".to_string(),
            default_network: "dockhand-network".to_string(),
            cert_resolver: "letsencrypt".to_string(),
            redirect_middleware: "redirect-to-https@file".to_string(),
            web_entrypoint: "web".to_string(),
            websecure_entrypoint: "websecure".to_string(),
            provider: RoutingProvider::Labels,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BuildConfig {
    pub heroku_builder: String,
    pub paketo_builder: String,
    pub railpack_frontend: String,
    pub static_base_image: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            heroku_builder: "heroku/builder:24".to_string(),
            paketo_builder: "paketobuildpacks/builder-jammy-full".to_string(),
            railpack_frontend: "ghcr.io/railwayapp/railpack-frontend:v0.2.2".to_string(),
            static_base_image: "nginx:alpine".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DockerConfig {
    /// Engine socket path on every host (local and remote).
    pub socket: String,
    /// Per-request timeout for engine API calls.
    pub timeout_secs: u64,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket: "/var/run/docker.sock".to_string(),
            timeout_secs: 120,
        }
    }
}

/// SSH coordinates of a remote server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub address: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default = "default_ssh_user")]
    pub user: String,
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_ssh_user() -> String {
    "root".to_string()
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn server(&self, id: &str) -> Option<&ServerConfig> {
        self.servers.get(id)
    }

    /// Path layout rooted at the configured base directory.
    pub fn paths(&self) -> AppPaths {
        AppPaths::new(&self.paths.base_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.proxy.default_network, "dockhand-network");
        assert_eq!(config.engine.timeout_secs, 120);
    }

    #[test]
    fn test_parse_servers() {
        let toml_str = r#"
[paths]
base_dir = "/srv/dockhand"

[proxy]
cert_resolver = "le-staging"
provider = "file"

[servers.edge-1]
address = "10.0.0.5"
identity_file = "/root/.ssh/edge"
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.paths.base_dir, PathBuf::from("/srv/dockhand"));
        assert_eq!(config.proxy.cert_resolver, "le-staging");
        assert_eq!(config.proxy.provider, RoutingProvider::File);
        // Untouched proxy fields keep their defaults.
        assert_eq!(config.proxy.service_name, "dockhand-traefik");

        let server = config.server("edge-1").unwrap();
        assert_eq!(server.port, 22);
        assert_eq!(server.user, "root");
        assert!(config.server("edge-2").is_none());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_or_default(&dir.path().join("dockhand.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dockhand.toml");
        let mut config = EngineConfig::default();
        config.servers.insert(
            "edge-1".into(),
            ServerConfig {
                address: "edge.internal".into(),
                port: 2222,
                user: "deploy".into(),
                identity_file: None,
            },
        );
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();
        let loaded = EngineConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
