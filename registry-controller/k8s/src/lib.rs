#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod service;

#[cfg(test)]
mod tests;

pub use self::service::{endpoint_for, is_denied, is_headless, select_port};
use anyhow::anyhow;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, ListParams};
use registry_controller_core::{Discover, DiscoveryMode, Error, ServiceEndpoint};
use std::time::Duration;
use tokio::time;
use tracing::{debug, info, instrument, warn};

/// Lists the services in a namespace.
///
/// Returns `None` when the namespace does not exist.
#[async_trait::async_trait]
pub trait ServiceSource: Send + Sync {
    async fn list_services(&self, namespace: &str) -> anyhow::Result<Option<Vec<Service>>>;
}

/// Discovers agent services in exactly one cluster namespace.
#[derive(Clone, Debug)]
pub struct KubernetesDiscovery<S = kube::Client> {
    source: S,
    namespace: String,
    timeout: Duration,
}

// === impl KubernetesDiscovery ===

impl<S: ServiceSource> KubernetesDiscovery<S> {
    pub fn new(source: S, namespace: impl Into<String>, timeout: Duration) -> Self {
        Self {
            source,
            namespace: namespace.into(),
            timeout,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[async_trait::async_trait]
impl<S: ServiceSource> Discover for KubernetesDiscovery<S> {
    fn mode(&self) -> DiscoveryMode {
        DiscoveryMode::Kubernetes
    }

    #[instrument(skip(self), fields(namespace = %self.namespace))]
    async fn discover(&self) -> Result<Vec<ServiceEndpoint>, Error> {
        let services =
            match time::timeout(self.timeout, self.source.list_services(&self.namespace)).await {
                Ok(Ok(Some(services))) => services,
                Ok(Ok(None)) => {
                    warn!("Namespace not found");
                    return Ok(Vec::new());
                }
                Ok(Err(error)) => return Err(Error::DiscoveryUnavailable(error)),
                Err(_) => {
                    return Err(Error::DiscoveryUnavailable(anyhow!(
                        "listing services timed out after {:?}",
                        self.timeout
                    )))
                }
            };

        let mut endpoints = Vec::with_capacity(services.len());
        for svc in &services {
            match endpoint_for(svc, &self.namespace) {
                Ok(Some(ep)) => {
                    info!(service = %ep.name, host = %ep.host, port = ep.port, "Discovered");
                    endpoints.push(ep);
                }
                Ok(None) => {}
                Err(error) => warn!(%error, "Skipping service"),
            }
        }
        debug!(listed = services.len(), eligible = endpoints.len());
        Ok(endpoints)
    }
}

// === impl ServiceSource ===

#[async_trait::async_trait]
impl ServiceSource for kube::Client {
    async fn list_services(&self, namespace: &str) -> anyhow::Result<Option<Vec<Service>>> {
        let api = Api::<Service>::namespaced(self.clone(), namespace);
        match api.list(&ListParams::default()).await {
            Ok(list) => Ok(Some(list.items)),
            Err(kube::Error::Api(rsp)) if rsp.code == 404 => Ok(None),
            Err(error) => Err(error.into()),
        }
    }
}
