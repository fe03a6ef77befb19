use crate::{default_methods, route_name, DiscoveryMode, GatewayRoute, GatewayService, Middleware};

const DEFAULT_WEB_PATH: &str = "/app";

/// A permanently pinned proxy route.
///
/// Static proxies are registered like discovered endpoints but are never
/// discovered and never garbage-collected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticProxyConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub paths: Vec<String>,
    pub methods: Vec<String>,
    pub strip_path: bool,
    pub preserve_host: bool,

    /// Appended to the upstream URL when non-empty.
    pub upstream_path: Option<String>,
    pub middlewares: Vec<Middleware>,
}

/// Operator overrides for the static proxy table.
#[derive(Clone, Debug, Default)]
pub struct StaticProxyOverrides {
    pub backend_host: Option<String>,
    pub web_host: Option<String>,
    pub web_path: Option<String>,
    pub auth_host: Option<String>,
    pub router_host: Option<String>,
    pub landing_host: Option<String>,
    pub n8n_host: Option<String>,
}

/// The fixed set of static proxies, resolved once at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StaticProxyRegistry {
    entries: Vec<StaticProxyConfig>,
}

#[derive(Copy, Clone, Debug)]
enum Upstream {
    Backend,
    Web,
    Auth,
    Router,
    Landing,
    N8n,
}

struct Template {
    name: &'static str,
    upstream: Upstream,
    port: u16,
    path: Option<&'static str>,
    strip_path: bool,
    preserve_host: bool,
    upstream_path: Option<&'static str>,
    middlewares: &'static [Middleware],
}

const TABLE: [Template; 6] = [
    Template {
        name: "backend-api-proxy",
        upstream: Upstream::Backend,
        port: 8000,
        path: Some("/api"),
        strip_path: false,
        preserve_host: false,
        upstream_path: None,
        middlewares: &[Middleware::Cors, Middleware::Auth],
    },
    // The web app is mounted at an operator-configurable path.
    Template {
        name: "web-app-proxy",
        upstream: Upstream::Web,
        port: 4000,
        path: None,
        strip_path: true,
        preserve_host: false,
        upstream_path: None,
        middlewares: &[Middleware::Cors],
    },
    // Login and token exchange must be reachable without credentials.
    Template {
        name: "auth-proxy",
        upstream: Upstream::Auth,
        port: 8001,
        path: Some("/auth"),
        strip_path: false,
        preserve_host: false,
        upstream_path: None,
        middlewares: &[Middleware::Cors],
    },
    Template {
        name: "router",
        upstream: Upstream::Router,
        port: 8000,
        path: Some("/router"),
        strip_path: false,
        preserve_host: false,
        upstream_path: Some(""),
        middlewares: &[Middleware::Cors, Middleware::Auth, Middleware::RequestLogger],
    },
    Template {
        name: "landing-page",
        upstream: Upstream::Landing,
        port: 4000,
        path: Some("/"),
        strip_path: false,
        preserve_host: true,
        upstream_path: Some("/app/"),
        middlewares: &[Middleware::Cors],
    },
    Template {
        name: "n8n",
        upstream: Upstream::N8n,
        port: 5678,
        path: Some("/n8n"),
        strip_path: true,
        preserve_host: false,
        upstream_path: None,
        middlewares: &[Middleware::Cors],
    },
];

// === impl StaticProxyConfig ===

impl StaticProxyConfig {
    pub fn url(&self) -> String {
        match self.upstream_path.as_deref() {
            Some(path) if !path.is_empty() => format!("http://{}:{}{}", self.host, self.port, path),
            _ => format!("http://{}:{}", self.host, self.port),
        }
    }

    pub fn service(&self) -> GatewayService {
        GatewayService::new(&self.name, self.url())
    }

    pub fn route(&self) -> GatewayRoute {
        GatewayRoute {
            name: route_name(&self.name),
            service: self.name.clone(),
            paths: self.paths.clone(),
            methods: self.methods.clone(),
            strip_path: self.strip_path,
            preserve_host: self.preserve_host,
        }
    }
}

// === impl StaticProxyOverrides ===

impl StaticProxyOverrides {
    fn host(&self, upstream: Upstream) -> Option<&str> {
        let host = match upstream {
            Upstream::Backend => &self.backend_host,
            Upstream::Web => &self.web_host,
            Upstream::Auth => &self.auth_host,
            Upstream::Router => &self.router_host,
            Upstream::Landing => &self.landing_host,
            Upstream::N8n => &self.n8n_host,
        };
        host.as_deref().map(str::trim).filter(|h| !h.is_empty())
    }

    /// The web app mount point, always with a leading `/`.
    pub fn web_path(&self) -> String {
        let path = self
            .web_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_WEB_PATH);
        if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        }
    }

    /// Resolves the auth service host: the override, else the
    /// cluster-DNS name or the container name depending on `mode`.
    pub fn auth_host(&self, mode: DiscoveryMode, platform_namespace: &str) -> String {
        resolve_host(self.host(Upstream::Auth), Upstream::Auth, mode, platform_namespace)
    }
}

// === impl Upstream ===

impl Upstream {
    fn cluster_service(&self) -> &'static str {
        match self {
            Self::Backend => "backend",
            Self::Web | Self::Landing => "web",
            Self::Auth => "auth",
            Self::Router => "router",
            Self::N8n => "n8n",
        }
    }

    fn container(&self) -> &'static str {
        match self {
            Self::Backend => "backend",
            Self::Web | Self::Landing => "web",
            Self::Auth => "auth-service",
            Self::Router => "router",
            Self::N8n => "n8n",
        }
    }
}

fn resolve_host(
    host_override: Option<&str>,
    upstream: Upstream,
    mode: DiscoveryMode,
    platform_namespace: &str,
) -> String {
    if let Some(host) = host_override {
        return host.to_string();
    }
    match mode {
        DiscoveryMode::Kubernetes => format!(
            "{}.{}.svc.cluster.local",
            upstream.cluster_service(),
            platform_namespace
        ),
        DiscoveryMode::Docker => upstream.container().to_string(),
    }
}

// === impl StaticProxyRegistry ===

impl StaticProxyRegistry {
    /// Builds the static proxy table for the active discovery mode.
    pub fn resolve(
        mode: DiscoveryMode,
        platform_namespace: &str,
        overrides: &StaticProxyOverrides,
    ) -> Self {
        let web_path = overrides.web_path();
        let entries = TABLE
            .iter()
            .map(|t| StaticProxyConfig {
                name: t.name.to_string(),
                host: resolve_host(
                    overrides.host(t.upstream),
                    t.upstream,
                    mode,
                    platform_namespace,
                ),
                port: t.port,
                paths: vec![t.path.map(str::to_string).unwrap_or_else(|| web_path.clone())],
                methods: default_methods(),
                strip_path: t.strip_path,
                preserve_host: t.preserve_host,
                upstream_path: t.upstream_path.map(str::to_string),
                middlewares: t.middlewares.to_vec(),
            })
            .collect();
        Self { entries }
    }

    pub fn from_entries(entries: Vec<StaticProxyConfig>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[StaticProxyConfig] {
        &self.entries
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn entry<'r>(registry: &'r StaticProxyRegistry, name: &str) -> &'r StaticProxyConfig {
        registry
            .entries()
            .iter()
            .find(|e| e.name == name)
            .expect("entry must exist")
    }

    #[test]
    fn table_names() {
        let registry = StaticProxyRegistry::resolve(
            DiscoveryMode::Kubernetes,
            "platform",
            &Default::default(),
        );
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec![
                "backend-api-proxy",
                "web-app-proxy",
                "auth-proxy",
                "router",
                "landing-page",
                "n8n"
            ]
        );
        assert!(registry.contains("landing-page"));
        assert!(!registry.contains("agent-x"));
    }

    #[rstest]
    #[case::kubernetes(DiscoveryMode::Kubernetes, "auth.platform.svc.cluster.local")]
    #[case::docker(DiscoveryMode::Docker, "auth-service")]
    fn hosts_follow_discovery_mode(#[case] mode: DiscoveryMode, #[case] host: &str) {
        let registry = StaticProxyRegistry::resolve(mode, "platform", &Default::default());
        assert_eq!(entry(&registry, "auth-proxy").host, host);
    }

    #[test]
    fn overrides_win() {
        let overrides = StaticProxyOverrides {
            backend_host: Some("api.internal".to_string()),
            web_path: Some("portal".to_string()),
            ..Default::default()
        };
        let registry =
            StaticProxyRegistry::resolve(DiscoveryMode::Kubernetes, "platform", &overrides);
        assert_eq!(entry(&registry, "backend-api-proxy").host, "api.internal");
        assert_eq!(entry(&registry, "web-app-proxy").paths, vec!["/portal"]);
    }

    #[rstest]
    #[case(None, "/app")]
    #[case(Some("  "), "/app")]
    #[case(Some("/ui"), "/ui")]
    #[case(Some("ui"), "/ui")]
    fn web_path(#[case] input: Option<&str>, #[case] expected: &str) {
        let overrides = StaticProxyOverrides {
            web_path: input.map(str::to_string),
            ..Default::default()
        };
        assert_eq!(overrides.web_path(), expected);
    }

    #[test]
    fn upstream_path_extends_url() {
        let registry =
            StaticProxyRegistry::resolve(DiscoveryMode::Docker, "platform", &Default::default());
        assert_eq!(entry(&registry, "landing-page").url(), "http://web:4000/app/");
        // An empty upstream path leaves the URL bare.
        assert_eq!(entry(&registry, "router").url(), "http://router:8000");

        let route = entry(&registry, "landing-page").route();
        assert_eq!(route.name, "landing-page-route");
        assert!(route.preserve_host);
    }
}
