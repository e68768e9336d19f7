//! File-provider routing: one `{app}.yml` per application in the proxy's
//! hot-reloaded dynamic configuration directory.
//!
//! Files are read and written through the gateway shell, so remote hosts
//! behave exactly like the local one.

use std::collections::BTreeMap;
use std::sync::Arc;

use dockhand_core::validate::validate_domains;
use dockhand_core::{AppPaths, Domain, ProxyConfig};
use dockhand_exec::files::{create_file_command, read_file_command, remove_file_command};
use dockhand_exec::{ExecutionContext, Shell};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ProxyError, ProxyResult};
use crate::labels::{
    add_prefix_middleware, cert_resolver, path_middlewares, router_names, router_rule,
    strip_prefix_middleware,
};

// ── YAML model ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileConfig {
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HttpConfig {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub routers: BTreeMap<String, FileRouter>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub services: BTreeMap<String, FileService>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub middlewares: BTreeMap<String, FileMiddleware>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileRouter {
    pub rule: String,
    pub service: String,
    pub entry_points: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub middlewares: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<FileTls>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileTls {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_resolver: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileService {
    pub load_balancer: FileLoadBalancer,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileLoadBalancer {
    pub servers: Vec<FileServer>,
    #[serde(default = "default_true")]
    pub pass_host_header: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileServer {
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileMiddleware {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strip_prefix: Option<StripPrefix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_prefix: Option<AddPrefix>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StripPrefix {
    pub prefixes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddPrefix {
    pub prefix: String,
}

impl FileConfig {
    pub fn parse(text: &str) -> ProxyResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| ProxyError::DynamicConfig(e.to_string()))
    }

    pub fn to_yaml(&self) -> ProxyResult<String> {
        serde_yaml::to_string(self).map_err(|e| ProxyError::DynamicConfig(e.to_string()))
    }

    pub fn has_routers(&self) -> bool {
        !self.http.routers.is_empty()
    }

    /// Add or replace the routers, services and middlewares of `domain`.
    pub fn upsert_domain(&mut self, app_name: &str, domain: &Domain, proxy: &ProxyConfig) {
        let key = &domain.unique_config_key;
        self.remove_domain(app_name, key);

        let (web, websecure) = router_names(app_name, key);
        let rule = router_rule(domain);
        let path_mw = path_middlewares(app_name, domain);
        let url = format!("http://{app_name}:{}", domain.port);

        let mut web_chain = Vec::new();
        if domain.https {
            web_chain.push(proxy.redirect_middleware.clone());
        }
        web_chain.extend(path_mw.iter().cloned());

        self.http.routers.insert(
            web.clone(),
            FileRouter {
                rule: rule.clone(),
                service: web.clone(),
                entry_points: vec![proxy.web_entrypoint.clone()],
                middlewares: web_chain,
                tls: None,
            },
        );
        self.http.routers.insert(
            websecure.clone(),
            FileRouter {
                rule,
                service: websecure.clone(),
                entry_points: vec![proxy.websecure_entrypoint.clone()],
                middlewares: path_mw,
                tls: domain.https.then(|| FileTls {
                    cert_resolver: cert_resolver(domain, proxy).map(str::to_string),
                }),
            },
        );
        for name in [web, websecure] {
            self.http.services.insert(
                name,
                FileService {
                    load_balancer: FileLoadBalancer {
                        servers: vec![FileServer { url: url.clone() }],
                        pass_host_header: true,
                    },
                },
            );
        }

        if domain.strip_path {
            if let Some(path) = domain.non_root_path() {
                self.http.middlewares.insert(
                    strip_prefix_middleware(app_name, key),
                    FileMiddleware {
                        strip_prefix: Some(StripPrefix {
                            prefixes: vec![path.to_string()],
                        }),
                        ..Default::default()
                    },
                );
            }
        }
        if let Some(prefix) = domain.non_root_internal_path() {
            self.http.middlewares.insert(
                add_prefix_middleware(app_name, key),
                FileMiddleware {
                    add_prefix: Some(AddPrefix {
                        prefix: prefix.to_string(),
                    }),
                    ..Default::default()
                },
            );
        }
    }

    /// Drop everything generated for one domain key. Returns true if
    /// anything was removed.
    pub fn remove_domain(&mut self, app_name: &str, key: &str) -> bool {
        let (web, websecure) = router_names(app_name, key);
        let mut removed = false;
        for name in [&web, &websecure] {
            removed |= self.http.routers.remove(name).is_some();
            removed |= self.http.services.remove(name).is_some();
        }
        removed |= self
            .http
            .middlewares
            .remove(&strip_prefix_middleware(app_name, key))
            .is_some();
        removed |= self
            .http
            .middlewares
            .remove(&add_prefix_middleware(app_name, key))
            .is_some();
        removed
    }

    /// Domain keys with a router in this file.
    pub fn domain_keys(&self, app_name: &str) -> Vec<String> {
        let prefix = format!("{app_name}-");
        let mut keys: Vec<String> = self
            .http
            .routers
            .keys()
            .filter_map(|name| name.strip_prefix(&prefix))
            .filter_map(|rest| {
                rest.strip_suffix("-websecure")
                    .or_else(|| rest.strip_suffix("-web"))
            })
            .map(str::to_string)
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

// ── Persistence through the gateway ────────────────────────────────

/// Reads and writes `{app}.yml` files on the target host.
#[derive(Clone)]
pub struct DynamicConfigFiles {
    shell: Arc<dyn Shell>,
    paths: AppPaths,
    proxy: ProxyConfig,
}

impl DynamicConfigFiles {
    pub fn new(shell: Arc<dyn Shell>, paths: AppPaths, proxy: ProxyConfig) -> Self {
        Self { shell, paths, proxy }
    }

    pub async fn load(&self, ctx: &ExecutionContext, app_name: &str) -> ProxyResult<FileConfig> {
        let path = self.paths.dynamic_config(app_name);
        let out = self.shell.exec_checked(ctx, &read_file_command(&path)).await?;
        FileConfig::parse(&out.stdout)
    }

    /// Write `config`, or remove the file once it has no routers left.
    pub async fn save(&self, ctx: &ExecutionContext, app_name: &str, config: &FileConfig) -> ProxyResult<()> {
        let path = self.paths.dynamic_config(app_name);
        if config.has_routers() {
            let yaml = config.to_yaml()?;
            self.shell
                .exec_checked(ctx, &create_file_command(&path, yaml.as_bytes()))
                .await?;
            debug!(app = %app_name, %path, routers = config.http.routers.len(), "dynamic config written");
        } else {
            self.shell.exec_checked(ctx, &remove_file_command(&path)).await?;
            debug!(app = %app_name, %path, "dynamic config removed");
        }
        Ok(())
    }

    pub async fn upsert_domain(&self, ctx: &ExecutionContext, app_name: &str, domain: &Domain) -> ProxyResult<()> {
        validate_domains(app_name, std::slice::from_ref(domain))?;
        let mut config = self.load(ctx, app_name).await?;
        config.upsert_domain(app_name, domain, &self.proxy);
        self.save(ctx, app_name, &config).await
    }

    pub async fn remove_domain(&self, ctx: &ExecutionContext, app_name: &str, key: &str) -> ProxyResult<bool> {
        let mut config = self.load(ctx, app_name).await?;
        let removed = config.remove_domain(app_name, key);
        if removed {
            self.save(ctx, app_name, &config).await?;
        }
        Ok(removed)
    }

    /// Make the file describe exactly `domains`.
    pub async fn sync_domains(&self, ctx: &ExecutionContext, app_name: &str, domains: &[Domain]) -> ProxyResult<()> {
        validate_domains(app_name, domains)?;
        let mut config = self.load(ctx, app_name).await?;
        let mut removed = 0;
        for key in config.domain_keys(app_name) {
            if !domains.iter().any(|d| d.unique_config_key == key) {
                config.remove_domain(app_name, &key);
                removed += 1;
            }
        }
        for domain in domains {
            config.upsert_domain(app_name, domain, &self.proxy);
        }
        self.save(ctx, app_name, &config).await?;
        info!(app = %app_name, domains = domains.len(), removed, "dynamic routing synced");
        Ok(())
    }
}
