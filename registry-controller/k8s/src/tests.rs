use super::*;
use k8s_openapi::{
    api::core::v1::{ServicePort, ServiceSpec},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use maplit::btreeset;
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;

pub(crate) fn mk_svc(
    name: &str,
    cluster_ip: Option<&str>,
    ports: &[(Option<&str>, i32)],
) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("agents".to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            cluster_ip: cluster_ip.map(str::to_string),
            ports: Some(
                ports
                    .iter()
                    .map(|(name, port)| ServicePort {
                        name: name.map(str::to_string),
                        port: *port,
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        status: None,
    }
}

enum Fake {
    Listed(Vec<Service>),
    MissingNamespace,
    Unreachable,
    Stalled,
}

#[async_trait::async_trait]
impl ServiceSource for Fake {
    async fn list_services(&self, namespace: &str) -> anyhow::Result<Option<Vec<Service>>> {
        assert_eq!(namespace, "agents");
        match self {
            Self::Listed(services) => Ok(Some(services.clone())),
            Self::MissingNamespace => Ok(None),
            Self::Unreachable => Err(anyhow!("connection refused")),
            Self::Stalled => std::future::pending().await,
        }
    }
}

fn discovery(source: Fake) -> KubernetesDiscovery<Fake> {
    KubernetesDiscovery::new(source, "agents", Duration::from_millis(50))
}

#[tokio::test]
async fn returns_only_clean_agents() {
    let http = &[(Some("http"), 5000)][..];
    let discovery = discovery(Fake::Listed(vec![
        mk_svc("kubernetes", Some("10.0.0.1"), &[(Some("https"), 443)]),
        mk_svc("coredns", Some("10.0.0.10"), &[(Some("dns"), 53)]),
        mk_svc("orders-postgres", Some("10.0.0.20"), &[(Some("pg"), 5432)]),
        mk_svc("cache-redis-master", Some("10.0.0.21"), http),
        mk_svc("agent-research-headless", Some("None"), http),
        mk_svc("agent-stateful", Some("None"), http),
        mk_svc("agent-research", Some("10.0.0.30"), http),
    ]));

    let names = discovery
        .discover()
        .await
        .unwrap()
        .into_iter()
        .map(|ep| ep.name)
        .collect::<BTreeSet<_>>();
    assert_eq!(names, btreeset! {"agent-research".to_string()});
}

#[tokio::test]
async fn unusable_service_does_not_abort_discovery() {
    let discovery = discovery(Fake::Listed(vec![
        mk_svc("agent-portless", Some("10.0.0.31"), &[]),
        mk_svc("agent-ok", Some("10.0.0.32"), &[(None, 5000)]),
    ]));

    let endpoints = discovery.discover().await.unwrap();
    assert_eq!(
        endpoints,
        vec![ServiceEndpoint::new(
            "agent-ok",
            "agent-ok.agents.svc.cluster.local",
            5000,
            "agents"
        )]
    );
}

#[tokio::test]
async fn missing_namespace_is_empty() {
    let endpoints = discovery(Fake::MissingNamespace).discover().await.unwrap();
    assert!(endpoints.is_empty());
}

#[tokio::test]
async fn backend_failures_are_unavailable() {
    assert!(matches!(
        discovery(Fake::Unreachable).discover().await,
        Err(Error::DiscoveryUnavailable(_))
    ));
    assert!(matches!(
        discovery(Fake::Stalled).discover().await,
        Err(Error::DiscoveryUnavailable(_))
    ));
}
