use registry_controller_core::{Error, ServiceEndpoint};
use std::collections::BTreeSet;

/// Grouping tag for every container endpoint.
pub const NAMESPACE: &str = "docker-agents";

/// Platform containers sharing the agents network.
const DENIED_NAMES: [&str; 12] = [
    "kong-gateway",
    "kong-database",
    "kong-migrations",
    "kong-service-registry",
    "backend",
    "web",
    "router",
    "auth-service",
    "chat-history",
    "redis",
    "mongodb",
    "observability",
];

/// The fields of an inspected container that discovery looks at.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Container {
    pub name: String,
    pub running: bool,

    /// Port keys (`5000/tcp`) that have at least one host binding.
    pub published: BTreeSet<String>,
}

/// Criteria a container must meet to be exposed as an agent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Eligibility {
    pub prefix: String,
    pub port: u16,
}

pub fn is_denied(name: &str) -> bool {
    DENIED_NAMES.contains(&name)
}

// === impl Container ===

impl Container {
    /// Strips the leading `/` the engine puts on container names.
    pub fn new(name: &str, running: bool, published: impl IntoIterator<Item = String>) -> Self {
        Self {
            name: name.trim_start_matches('/').to_string(),
            running,
            published: published.into_iter().collect(),
        }
    }
}

// === impl Eligibility ===

impl Eligibility {
    fn port_key(&self) -> String {
        format!("{}/tcp", self.port)
    }

    /// Maps a container to an endpoint.
    ///
    /// Returns `Ok(None)` when the container is filtered out and an error when
    /// it looks like an agent but cannot be routed to.
    pub fn endpoint_for(&self, container: &Container) -> Result<Option<ServiceEndpoint>, Error> {
        let name = container.name.as_str();
        if !container.running {
            tracing::debug!(container = %name, "Not running");
            return Ok(None);
        }
        if is_denied(name) {
            tracing::debug!(container = %name, "Infrastructure container");
            return Ok(None);
        }
        if !name.starts_with(&self.prefix) {
            tracing::debug!(container = %name, prefix = %self.prefix, "Not an agent");
            return Ok(None);
        }

        let key = self.port_key();
        if !container.published.contains(&key) {
            return Err(Error::skipped(name, format!("port {key} is not exposed")));
        }
        Ok(Some(ServiceEndpoint::new(name, name, self.port, NAMESPACE)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn eligibility() -> Eligibility {
        Eligibility {
            prefix: "agent-".to_string(),
            port: 5000,
        }
    }

    fn running(name: &str) -> Container {
        Container::new(name, true, ["5000/tcp".to_string()])
    }

    #[test]
    fn strips_leading_slash() {
        assert_eq!(running("/agent-x").name, "agent-x");
    }

    #[test]
    fn agent_container_is_routed_by_name() {
        let ep = eligibility().endpoint_for(&running("agent-x")).unwrap().unwrap();
        assert_eq!(ep, ServiceEndpoint::new("agent-x", "agent-x", 5000, "docker-agents"));
    }

    #[rstest]
    #[case::stopped(Container::new("agent-x", false, ["5000/tcp".to_string()]))]
    #[case::infrastructure(running("kong-gateway"))]
    #[case::platform(running("chat-history"))]
    #[case::not_an_agent(running("grafana"))]
    fn filtered(#[case] container: Container) {
        assert_eq!(eligibility().endpoint_for(&container).unwrap(), None);
    }

    #[test]
    fn unexposed_port_is_skipped() {
        let container = Container::new("agent-x", true, ["8080/tcp".to_string()]);
        assert!(matches!(
            eligibility().endpoint_for(&container),
            Err(Error::TargetSkipped { name, .. }) if name == "agent-x"
        ));
    }
}
