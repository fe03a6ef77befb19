#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod container;


pub use self::container::{is_denied, Container, Eligibility, NAMESPACE};
use anyhow::anyhow;
use bollard::{container::InspectContainerOptions, network::InspectNetworkOptions, Docker};
use registry_controller_core::{Discover, DiscoveryMode, Error, ServiceEndpoint};
use std::time::Duration;
use tokio::time;
use tracing::{debug, info, instrument, warn};

/// Read-only access to the container engine.
#[async_trait::async_trait]
pub trait ContainerSource: Send + Sync {
    /// Lists the IDs of containers attached to `network`, or `None` when the
    /// network does not exist.
    async fn list_network(&self, network: &str) -> anyhow::Result<Option<Vec<String>>>;

    async fn inspect(&self, id: &str) -> anyhow::Result<Container>;
}

/// Discovers agent containers attached to one network.
#[derive(Clone, Debug)]
pub struct DockerDiscovery<S = Docker> {
    source: S,
    network: String,
    eligibility: Eligibility,
    timeout: Duration,
}

// === impl DockerDiscovery ===

impl DockerDiscovery {
    /// Connects to the local engine (`DOCKER_HOST` or the default socket).
    pub fn connect(
        network: impl Into<String>,
        eligibility: Eligibility,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self::new(docker, network, eligibility, timeout))
    }
}

impl<S: ContainerSource> DockerDiscovery<S> {
    pub fn new(
        source: S,
        network: impl Into<String>,
        eligibility: Eligibility,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            network: network.into(),
            eligibility,
            timeout,
        }
    }

    async fn endpoint(&self, id: &str) -> Result<Option<ServiceEndpoint>, Error> {
        let container = match time::timeout(self.timeout, self.source.inspect(id)).await {
            Ok(Ok(container)) => container,
            Ok(Err(error)) => return Err(Error::skipped(id, error.to_string())),
            Err(_) => return Err(Error::skipped(id, "inspect timed out")),
        };
        self.eligibility.endpoint_for(&container)
    }
}

#[async_trait::async_trait]
impl<S: ContainerSource> Discover for DockerDiscovery<S> {
    fn mode(&self) -> DiscoveryMode {
        DiscoveryMode::Docker
    }

    #[instrument(skip(self), fields(network = %self.network))]
    async fn discover(&self) -> Result<Vec<ServiceEndpoint>, Error> {
        let ids = match time::timeout(self.timeout, self.source.list_network(&self.network)).await
        {
            Ok(Ok(Some(ids))) => ids,
            Ok(Ok(None)) => {
                warn!("Network not found");
                return Ok(Vec::new());
            }
            Ok(Err(error)) => return Err(Error::DiscoveryUnavailable(error)),
            Err(_) => {
                return Err(Error::DiscoveryUnavailable(anyhow!(
                    "listing containers timed out after {:?}",
                    self.timeout
                )))
            }
        };

        let mut endpoints = Vec::new();
        for id in &ids {
            match self.endpoint(id).await {
                Ok(Some(ep)) => {
                    info!(container = %ep.name, port = ep.port, "Discovered");
                    endpoints.push(ep);
                }
                Ok(None) => {}
                Err(error) => warn!(%error, "Skipping container"),
            }
        }
        debug!(attached = ids.len(), eligible = endpoints.len());
        Ok(endpoints)
    }
}

// === impl ContainerSource ===

#[async_trait::async_trait]
impl ContainerSource for Docker {
    async fn list_network(&self, network: &str) -> anyhow::Result<Option<Vec<String>>> {
        let network = match self
            .inspect_network(network, None::<InspectNetworkOptions<String>>)
            .await
        {
            Ok(network) => network,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        let mut ids = network
            .containers
            .unwrap_or_default()
            .into_keys()
            .collect::<Vec<_>>();
        ids.sort();
        Ok(Some(ids))
    }

    async fn inspect(&self, id: &str) -> anyhow::Result<Container> {
        let info = self
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;
        let running = info
            .state
            .as_ref()
            .and_then(|state| state.running)
            .unwrap_or(false);
        let published = info
            .network_settings
            .and_then(|settings| settings.ports)
            .unwrap_or_default()
            .into_iter()
            .filter(|(_, bindings)| bindings.as_ref().is_some_and(|b| !b.is_empty()))
            .map(|(port, _)| port);
        Ok(Container::new(
            info.name.as_deref().unwrap_or(id),
            running,
            published,
        ))
    }
}
