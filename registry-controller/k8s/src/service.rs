use k8s_openapi::api::core::v1::{Service, ServicePort};
use registry_controller_core::{Error, ServiceEndpoint};

/// Platform services that are never exposed, matched exactly.
const DENIED_NAMES: [&str; 5] = [
    "kubernetes",
    "kube-dns",
    "kube-proxy",
    "metrics-server",
    "coredns",
];

/// Name fragments that mark stateful or database workloads.
const DENIED_PATTERNS: [&str; 10] = [
    "headless",
    "postgres",
    "redis",
    "mongodb",
    "mysql",
    "elasticsearch",
    "kafka",
    "zookeeper",
    "cassandra",
    "etcd",
];

/// Port names preferred over declaration order.
const PREFERRED_PORT_NAMES: [&str; 4] = ["http", "api", "web", "rest"];

/// A headless service reports this in place of a cluster IP.
const HEADLESS: &str = "None";

pub fn is_denied(name: &str) -> bool {
    if DENIED_NAMES.contains(&name) {
        return true;
    }
    let name = name.to_ascii_lowercase();
    DENIED_PATTERNS.iter().any(|p| name.contains(p))
}

pub fn is_headless(svc: &Service) -> bool {
    svc.spec
        .as_ref()
        .and_then(|spec| spec.cluster_ip.as_deref())
        == Some(HEADLESS)
}

/// Picks the first port whose name is preferred, else the first port.
pub fn select_port(ports: &[ServicePort]) -> Option<&ServicePort> {
    ports
        .iter()
        .find(|p| {
            p.name.as_deref().is_some_and(|name| {
                PREFERRED_PORT_NAMES
                    .iter()
                    .any(|preferred| name.eq_ignore_ascii_case(preferred))
            })
        })
        .or_else(|| ports.first())
}

/// Maps a cluster service to an endpoint.
///
/// Returns `Ok(None)` when the service is filtered out and an error when it is
/// eligible but unusable.
pub fn endpoint_for(svc: &Service, namespace: &str) -> Result<Option<ServiceEndpoint>, Error> {
    let name = svc
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| Error::skipped("<unnamed>", "service has no name"))?;

    if is_denied(name) {
        tracing::debug!(service = %name, "Denylisted");
        return Ok(None);
    }
    if is_headless(svc) {
        tracing::debug!(service = %name, "Headless");
        return Ok(None);
    }

    let ports = svc
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_deref())
        .unwrap_or_default();
    let port = select_port(ports).ok_or_else(|| Error::skipped(name, "no ports declared"))?;
    let port = u16::try_from(port.port)
        .map_err(|_| Error::skipped(name, format!("invalid port {}", port.port)))?;

    let host = format!("{name}.{namespace}.svc.cluster.local");
    Ok(Some(ServiceEndpoint::new(name, host, port, namespace)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::mk_svc;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("kubernetes", true)]
    #[case("coredns", true)]
    #[case("orders-postgres", true)]
    #[case("Session-Redis", true)]
    #[case("agent-headless", true)]
    #[case("agent-research", false)]
    // Exact names only match exactly.
    #[case("kube-dns-agent", false)]
    fn denylist(#[case] name: &str, #[case] denied: bool) {
        assert_eq!(is_denied(name), denied);
    }

    #[rstest]
    #[case::named(&[(Some("metrics"), 9090), (Some("http"), 8080)], 8080)]
    #[case::case_insensitive(&[(Some("grpc"), 9000), (Some("API"), 8000)], 8000)]
    #[case::first_preferred_wins(&[(Some("web"), 4000), (Some("http"), 8080)], 4000)]
    #[case::fallback(&[(Some("grpc"), 9000), (None, 5000)], 9000)]
    fn port_selection(#[case] ports: &[(Option<&str>, i32)], #[case] expected: i32) {
        let svc = mk_svc("agent", None, ports);
        let ports = svc.spec.unwrap().ports.unwrap();
        assert_eq!(select_port(&ports).unwrap().port, expected);
    }

    #[test]
    fn endpoint_uses_cluster_dns() {
        let svc = mk_svc("agent-x", Some("10.0.0.12"), &[(Some("http"), 5000)]);
        let ep = endpoint_for(&svc, "agents").unwrap().unwrap();
        assert_eq!(ep.host, "agent-x.agents.svc.cluster.local");
        assert_eq!(ep.port, 5000);
        assert_eq!(ep.path, "/agents/agent-x");
        assert_eq!(ep.namespace, "agents");
    }

    #[test]
    fn headless_is_filtered() {
        let svc = mk_svc("agent-x", Some("None"), &[(Some("http"), 5000)]);
        assert_eq!(endpoint_for(&svc, "agents").unwrap(), None);
    }

    #[test]
    fn portless_is_skipped() {
        let svc = mk_svc("agent-x", None, &[]);
        assert!(matches!(
            endpoint_for(&svc, "agents"),
            Err(Error::TargetSkipped { name, .. }) if name == "agent-x"
        ));
    }
}
