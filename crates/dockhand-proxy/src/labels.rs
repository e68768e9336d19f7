//! Routing label generation.
//!
//! Each domain yields two routers, `{app}-{key}-web` and
//! `{app}-{key}-websecure`, each with a service of the same name pointing
//! at the domain's container port. Path middlewares are defined once per
//! domain and referenced from both routers.

use std::collections::BTreeMap;

use dockhand_core::validate::validate_domains;
use dockhand_core::{CertificateType, Domain, ProxyConfig};

use crate::error::ProxyResult;

pub type Labels = BTreeMap<String, String>;

/// Router names of a domain as `(web, websecure)`.
pub fn router_names(app_name: &str, key: &str) -> (String, String) {
    (
        format!("{app_name}-{key}-web"),
        format!("{app_name}-{key}-websecure"),
    )
}

pub fn strip_prefix_middleware(app_name: &str, key: &str) -> String {
    format!("stripprefix-{app_name}-{key}")
}

pub fn add_prefix_middleware(app_name: &str, key: &str) -> String {
    format!("addprefix-{app_name}-{key}")
}

/// `Host(...)` rule, with a `PathPrefix` for non-root paths.
pub fn router_rule(domain: &Domain) -> String {
    match domain.non_root_path() {
        Some(path) => format!("Host(`{}`) && PathPrefix(`{path}`)", domain.host),
        None => format!("Host(`{}`)", domain.host),
    }
}

/// Resolver for the domain's TLS router, if any.
pub fn cert_resolver<'a>(domain: &'a Domain, proxy: &'a ProxyConfig) -> Option<&'a str> {
    if !domain.https {
        return None;
    }
    match &domain.certificate {
        CertificateType::None => None,
        CertificateType::Managed => Some(proxy.cert_resolver.as_str()),
        CertificateType::Custom { resolver } => Some(resolver.as_str()),
    }
}

/// Path middlewares of a domain, in application order.
pub fn path_middlewares(app_name: &str, domain: &Domain) -> Vec<String> {
    let key = &domain.unique_config_key;
    let mut out = Vec::new();
    if domain.strip_path && domain.non_root_path().is_some() {
        out.push(strip_prefix_middleware(app_name, key));
    }
    if domain.non_root_internal_path().is_some() {
        out.push(add_prefix_middleware(app_name, key));
    }
    out
}

/// Labels for a single (already validated) domain.
pub fn domain_labels(app_name: &str, domain: &Domain, proxy: &ProxyConfig) -> Labels {
    let key = &domain.unique_config_key;
    let (web, websecure) = router_names(app_name, key);
    let rule = router_rule(domain);
    let path_mw = path_middlewares(app_name, domain);
    let mut labels = Labels::new();

    // Middleware definitions.
    if domain.strip_path {
        if let Some(path) = domain.non_root_path() {
            labels.insert(
                format!(
                    "traefik.http.middlewares.{}.stripprefix.prefixes",
                    strip_prefix_middleware(app_name, key)
                ),
                path.to_string(),
            );
        }
    }
    if let Some(prefix) = domain.non_root_internal_path() {
        labels.insert(
            format!(
                "traefik.http.middlewares.{}.addprefix.prefix",
                add_prefix_middleware(app_name, key)
            ),
            prefix.to_string(),
        );
    }

    for (router, entrypoint) in [
        (&web, &proxy.web_entrypoint),
        (&websecure, &proxy.websecure_entrypoint),
    ] {
        let base = format!("traefik.http.routers.{router}");
        labels.insert(format!("{base}.rule"), rule.clone());
        labels.insert(format!("{base}.entrypoints"), entrypoint.clone());
        labels.insert(format!("{base}.service"), router.clone());
        labels.insert(
            format!("traefik.http.services.{router}.loadbalancer.server.port"),
            domain.port.to_string(),
        );

        let mut chain = Vec::new();
        if router == &web && domain.https {
            chain.push(proxy.redirect_middleware.clone());
        }
        chain.extend(path_mw.iter().cloned());
        if !chain.is_empty() {
            labels.insert(format!("{base}.middlewares"), chain.join(","));
        }
    }

    if domain.https {
        labels.insert(format!("traefik.http.routers.{websecure}.tls"), "true".to_string());
        if let Some(resolver) = cert_resolver(domain, proxy) {
            labels.insert(
                format!("traefik.http.routers.{websecure}.tls.certresolver"),
                resolver.to_string(),
            );
        }
    }

    labels
}

/// Validate `domains` and generate every routing label for the service.
///
/// No domains means no labels: the service is not exposed.
pub fn generate_labels(
    app_name: &str,
    domains: &[Domain],
    network_name: &str,
    proxy: &ProxyConfig,
) -> ProxyResult<Labels> {
    validate_domains(app_name, domains)?;
    let mut labels = Labels::new();
    if domains.is_empty() {
        return Ok(labels);
    }
    labels.insert("traefik.enable".to_string(), "true".to_string());
    labels.insert("traefik.swarm.network".to_string(), network_name.to_string());
    labels.insert("traefik.docker.network".to_string(), network_name.to_string());
    for domain in domains {
        labels.extend(domain_labels(app_name, domain, proxy));
    }
    Ok(labels)
}

/// Combine static labels with generated ones. Generated keys win.
pub fn merge_labels(static_labels: &Labels, generated: &Labels) -> Labels {
    let mut out = static_labels.clone();
    out.extend(generated.iter().map(|(k, v)| (k.clone(), v.clone())));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockhand_core::ValidationError;

    use crate::error::ProxyError;

    fn make_domain(key: &str) -> Domain {
        Domain {
            host: "app.example.com".into(),
            path: Some("/".into()),
            port: 3000,
            https: false,
            certificate: CertificateType::None,
            strip_path: false,
            internal_path: None,
            unique_config_key: key.into(),
            network_id: None,
        }
    }

    fn router_count(labels: &Labels) -> usize {
        labels
            .keys()
            .filter(|k| k.starts_with("traefik.http.routers.") && k.ends_with(".rule"))
            .count()
    }

    #[test]
    fn https_managed_root_domain() {
        let mut domain = make_domain("k1");
        domain.https = true;
        domain.certificate = CertificateType::Managed;
        let proxy = ProxyConfig::default();
        let labels = generate_labels("web-1", &[domain], "dockhand-network", &proxy).unwrap();

        assert_eq!(
            labels["traefik.http.routers.web-1-k1-websecure.rule"],
            "Host(`app.example.com`)"
        );
        assert_eq!(
            labels["traefik.http.routers.web-1-k1-websecure.tls.certresolver"],
            "letsencrypt"
        );
        assert_eq!(labels["traefik.http.routers.web-1-k1-websecure.tls"], "true");
        assert_eq!(
            labels["traefik.http.routers.web-1-k1-web.middlewares"],
            "redirect-to-https@file"
        );
        assert_eq!(
            labels["traefik.http.services.web-1-k1-web.loadbalancer.server.port"],
            "3000"
        );
        assert_eq!(labels["traefik.http.routers.web-1-k1-web.service"], "web-1-k1-web");
        assert_eq!(labels["traefik.enable"], "true");
        assert_eq!(labels["traefik.swarm.network"], "dockhand-network");
    }

    #[test]
    fn strip_path_middleware_shared_by_both_routers() {
        let mut domain = make_domain("k1");
        domain.path = Some("/api".into());
        domain.strip_path = true;
        let labels = generate_labels("api-2", &[domain], "net", &ProxyConfig::default()).unwrap();

        assert_eq!(
            labels["traefik.http.middlewares.stripprefix-api-2-k1.stripprefix.prefixes"],
            "/api"
        );
        assert_eq!(
            labels["traefik.http.routers.api-2-k1-web.middlewares"],
            "stripprefix-api-2-k1"
        );
        assert_eq!(
            labels["traefik.http.routers.api-2-k1-websecure.middlewares"],
            "stripprefix-api-2-k1"
        );
        assert_eq!(
            labels["traefik.http.routers.api-2-k1-web.rule"],
            "Host(`app.example.com`) && PathPrefix(`/api`)"
        );
    }

    #[test]
    fn redirect_precedes_path_middlewares() {
        let mut domain = make_domain("k1");
        domain.https = true;
        domain.path = Some("/api".into());
        domain.strip_path = true;
        domain.internal_path = Some("/v1".into());
        let labels = generate_labels("api", &[domain], "net", &ProxyConfig::default()).unwrap();
        assert_eq!(
            labels["traefik.http.routers.api-k1-web.middlewares"],
            "redirect-to-https@file,stripprefix-api-k1,addprefix-api-k1"
        );
        assert_eq!(
            labels["traefik.http.routers.api-k1-websecure.middlewares"],
            "stripprefix-api-k1,addprefix-api-k1"
        );
        assert_eq!(
            labels["traefik.http.middlewares.addprefix-api-k1.addprefix.prefix"],
            "/v1"
        );
    }

    #[test]
    fn root_internal_path_adds_no_prefix() {
        let mut domain = make_domain("k1");
        domain.internal_path = Some("/".into());
        let labels = generate_labels("api", &[domain.clone()], "net", &ProxyConfig::default()).unwrap();
        assert!(!labels.keys().any(|k| k.contains("addprefix")));
        assert!(path_middlewares("api", &domain).is_empty());
    }

    #[test]
    fn plain_http_has_no_tls_or_redirect() {
        let mut domain = make_domain("k1");
        domain.certificate = CertificateType::Managed;
        let labels = generate_labels("web", &[domain], "net", &ProxyConfig::default()).unwrap();
        assert!(!labels.keys().any(|k| k.contains(".tls")));
        assert!(!labels.contains_key("traefik.http.routers.web-k1-web.middlewares"));
    }

    #[test]
    fn custom_resolver_and_none_certificate() {
        let proxy = ProxyConfig::default();
        let mut domain = make_domain("k1");
        domain.https = true;
        domain.certificate = CertificateType::Custom {
            resolver: "corp-ca".into(),
        };
        assert_eq!(cert_resolver(&domain, &proxy), Some("corp-ca"));
        domain.certificate = CertificateType::None;
        assert_eq!(cert_resolver(&domain, &proxy), None);
        let labels = domain_labels("web", &domain, &proxy);
        assert_eq!(labels["traefik.http.routers.web-k1-websecure.tls"], "true");
        assert!(!labels.contains_key("traefik.http.routers.web-k1-websecure.tls.certresolver"));
    }

    #[test]
    fn n_domains_give_two_n_routers() {
        let domains: Vec<_> = (0..5).map(|i| make_domain(&format!("k{i}"))).collect();
        let labels = generate_labels("web", &domains, "net", &ProxyConfig::default()).unwrap();
        assert_eq!(router_count(&labels), 10);
    }

    #[test]
    fn duplicate_keys_rejected() {
        let err = generate_labels(
            "web",
            &[make_domain("k1"), make_domain("k1")],
            "net",
            &ProxyConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ProxyError::Validation(ValidationError::DuplicateConfigKey { .. })
        ));
    }

    #[test]
    fn no_domains_no_labels() {
        let labels = generate_labels("web", &[], "net", &ProxyConfig::default()).unwrap();
        assert!(labels.is_empty());
    }

    #[test]
    fn generated_labels_win_on_merge() {
        let mut static_labels = Labels::new();
        static_labels.insert("traefik.enable".into(), "false".into());
        static_labels.insert("team".into(), "payments".into());
        let mut generated = Labels::new();
        generated.insert("traefik.enable".into(), "true".into());
        let merged = merge_labels(&static_labels, &generated);
        assert_eq!(merged["traefik.enable"], "true");
        assert_eq!(merged["team"], "payments");
    }
}
