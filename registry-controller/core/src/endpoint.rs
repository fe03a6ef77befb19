use crate::{default_methods, route_name, GatewayRoute, GatewayService};
use std::collections::HashMap;

/// A backend target found by a discovery adapter.
///
/// Endpoints are rebuilt from scratch on every tick; nothing holds on to them
/// across passes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub name: String,
    pub host: String,
    pub port: u16,

    /// Externally exposed prefix, always `/agents/{name}`.
    pub path: String,
    pub methods: Vec<String>,

    /// Grouping tag used only for logging.
    pub namespace: String,
}

// === impl ServiceEndpoint ===

impl ServiceEndpoint {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        namespace: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            path: format!("/agents/{name}"),
            name,
            host: host.into(),
            port,
            methods: default_methods(),
            namespace: namespace.into(),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn service(&self) -> GatewayService {
        GatewayService::new(&self.name, self.url())
    }

    pub fn route(&self) -> GatewayRoute {
        GatewayRoute {
            name: route_name(&self.name),
            service: self.name.clone(),
            paths: vec![self.path.clone()],
            methods: self.methods.clone(),
            strip_path: true,
            preserve_host: false,
        }
    }
}

/// Collapses endpoints sharing a name so that the last one wins.
///
/// The surviving endpoint keeps the position of the first occurrence so the
/// processing order stays stable between ticks.
pub fn dedup_last_wins(
    endpoints: impl IntoIterator<Item = ServiceEndpoint>,
) -> Vec<ServiceEndpoint> {
    let mut positions = HashMap::<String, usize>::new();
    let mut deduped = Vec::<ServiceEndpoint>::new();
    for endpoint in endpoints {
        match positions.get(&endpoint.name) {
            Some(&idx) => {
                tracing::debug!(name = %endpoint.name, "Duplicate endpoint; keeping the latest");
                deduped[idx] = endpoint;
            }
            None => {
                positions.insert(endpoint.name.clone(), deduped.len());
                deduped.push(endpoint);
            }
        }
    }
    deduped
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn endpoint_defaults() {
        let ep = ServiceEndpoint::new("agent-x", "agent-x.ns.svc", 5000, "ns");
        assert_eq!(ep.path, "/agents/agent-x");
        assert_eq!(ep.url(), "http://agent-x.ns.svc:5000");
        assert_eq!(
            ep.methods,
            vec!["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS"]
        );

        let route = ep.route();
        assert_eq!(route.name, "agent-x-route");
        assert_eq!(route.service, "agent-x");
        assert_eq!(route.paths, vec!["/agents/agent-x"]);
        assert!(route.strip_path);
        assert!(!route.preserve_host);
    }

    #[test]
    fn duplicates_keep_the_last_endpoint() {
        let deduped = dedup_last_wins(vec![
            ServiceEndpoint::new("a", "old", 80, "ns"),
            ServiceEndpoint::new("b", "b", 80, "ns"),
            ServiceEndpoint::new("a", "new", 81, "ns"),
        ]);
        assert_eq!(
            deduped,
            vec![
                ServiceEndpoint::new("a", "new", 81, "ns"),
                ServiceEndpoint::new("b", "b", 80, "ns"),
            ]
        );
    }
}
