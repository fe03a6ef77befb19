use crate::{ReconcileMetrics, RegistryState};
use chrono::Utc;
use registry_controller_core::{
    endpoint::dedup_last_wins, gateway::all_bound, is_reserved, Discover, DiscoveryMode, Error,
    GatewayAdmin, GatewayRoute, GatewayService, Middleware, MiddlewareCatalog, Plugin,
    ServiceEndpoint, StaticProxyRegistry,
};
use std::{collections::BTreeSet, sync::Arc};
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Drives the gateway towards the discovered and static sets.
///
/// Each [`Reconciler::tick`] walks the phases in order:
///
/// 1. gate on the gateway's health;
/// 2. register the static proxies, until that has fully succeeded once;
/// 3. discover the dynamic targets;
/// 4. converge each target's service, route and middleware chain;
/// 5. prune gateway services that are neither registered, static nor
///    reserved.
///
/// Ticks take `&mut self` and so can never overlap.
pub struct Reconciler {
    discover: Arc<dyn Discover>,
    gateway: Arc<dyn GatewayAdmin>,
    statics: StaticProxyRegistry,
    catalog: MiddlewareCatalog,
    bootstrapped: bool,
    state: watch::Sender<Arc<RegistryState>>,
    metrics: ReconcileMetrics,
}

/// What a single tick did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The gateway was unhealthy and nothing was attempted.
    pub skipped: bool,

    /// Every static proxy is registered, whether by this tick or an
    /// earlier one.
    pub bootstrapped: bool,
    pub registered: BTreeSet<String>,
    pub failed: BTreeSet<String>,
    pub pruned: BTreeSet<String>,
    pub prune_failed: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct Convergence {
    registered: BTreeSet<String>,
    failed: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct Pruned {
    deleted: BTreeSet<String>,
    failed: BTreeSet<String>,
}

// === impl Reconciler ===

impl Reconciler {
    pub fn new(
        discover: Arc<dyn Discover>,
        gateway: Arc<dyn GatewayAdmin>,
        statics: StaticProxyRegistry,
        catalog: MiddlewareCatalog,
        metrics: ReconcileMetrics,
    ) -> Self {
        let (state, _) = watch::channel(Arc::new(RegistryState::default()));
        Self {
            discover,
            gateway,
            statics,
            catalog,
            bootstrapped: false,
            state,
            metrics,
        }
    }

    pub fn mode(&self) -> DiscoveryMode {
        self.discover.mode()
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    /// Watches the state published at the end of each completed tick.
    pub fn subscribe(&self) -> watch::Receiver<Arc<RegistryState>> {
        self.state.subscribe()
    }

    pub fn state(&self) -> Arc<RegistryState> {
        self.state.borrow().clone()
    }

    pub async fn tick(&mut self) -> TickReport {
        if !self.gateway.healthy().await {
            warn!(error = %Error::GatewayUnreachable, "Skipping tick");
            self.metrics.tick_skipped();
            return TickReport {
                skipped: true,
                bootstrapped: self.bootstrapped,
                ..Default::default()
            };
        }

        if !self.bootstrapped {
            match self.bootstrap().instrument(info_span!("bootstrap")).await {
                Ok(()) => {
                    info!(proxies = self.statics.len(), "Registered static proxies");
                    self.bootstrapped = true;
                    self.metrics.bootstrapped();
                }
                Err(error) => warn!(%error, "Static proxies will be retried next tick"),
            }
        }

        let endpoints = match self.discover.discover().await {
            Ok(endpoints) => endpoints,
            Err(error) => {
                error!(%error, "Discovery failed; treating the target set as empty");
                Vec::new()
            }
        };
        debug!(endpoints = endpoints.len(), "Discovered");

        let Convergence { registered, failed } = self.converge(endpoints).await;
        let Pruned {
            deleted,
            failed: prune_failed,
        } = self.prune(&registered).await;

        self.metrics.tick_completed(registered.len());
        self.state
            .send_replace(Arc::new(RegistryState::synced(registered.clone(), Utc::now())));
        info!(
            registered = registered.len(),
            failed = failed.len(),
            pruned = deleted.len(),
            "Sync completed"
        );

        TickReport {
            skipped: false,
            bootstrapped: self.bootstrapped,
            registered,
            failed,
            pruned: deleted,
            prune_failed,
        }
    }

    /// Runs discovery and convergence outside the tick cadence.
    ///
    /// Unlike a tick this neither bootstraps nor prunes nor publishes state. A
    /// discovery backend that cannot be listed is reported as an error.
    pub async fn sync(&mut self) -> Result<usize, Error> {
        let endpoints = self.discover.discover().await?;
        let Convergence { registered, .. } = self.converge(endpoints).await;
        info!(registered = registered.len(), "Manual sync completed");
        Ok(registered.len())
    }

    /// Registers every static proxy.
    ///
    /// A failure on one proxy does not stop the others, but the phase as a
    /// whole only succeeds if all of them are fully registered.
    async fn bootstrap(&self) -> Result<(), Error> {
        let mut failed = 0;
        for entry in self.statics.entries() {
            let chain = self.catalog.chain(&entry.middlewares);
            match self.register(&entry.service(), &entry.route(), &chain).await {
                Ok(true) => debug!(proxy = %entry.name, "Registered"),
                Ok(false) => {
                    warn!(proxy = %entry.name, "Middleware chain incomplete");
                    failed += 1;
                }
                Err(error) => {
                    error!(proxy = %entry.name, %error);
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            return Err(Error::BootstrapIncomplete {
                failed,
                total: self.statics.len(),
            });
        }
        Ok(())
    }

    async fn converge(&self, endpoints: Vec<ServiceEndpoint>) -> Convergence {
        let chain = self.catalog.chain(&Middleware::DYNAMIC_CHAIN);
        let mut convergence = Convergence::default();

        for ep in dedup_last_wins(endpoints) {
            if self.statics.contains(&ep.name) || is_reserved(&ep.name) {
                let error = Error::skipped(&ep.name, "name is reserved for the platform");
                warn!(%error, "Skipping endpoint");
                continue;
            }

            let span = info_span!("endpoint", service = %ep.name, namespace = %ep.namespace);
            match self
                .register(&ep.service(), &ep.route(), &chain)
                .instrument(span)
                .await
            {
                Ok(bound) => {
                    if !bound {
                        warn!(service = %ep.name, "Registered without a complete middleware chain");
                    }
                    convergence.registered.insert(ep.name);
                }
                Err(error) => {
                    error!(%error);
                    self.metrics.upsert_failed();
                    convergence.failed.insert(ep.name);
                }
            }
        }

        convergence
    }

    /// Upserts a service and its route, then binds the chain to the route.
    ///
    /// Returns whether every middleware was bound. Binding failures are
    /// retried on the next pass and do not fail the registration.
    async fn register(
        &self,
        service: &GatewayService,
        route: &GatewayRoute,
        chain: &[Plugin],
    ) -> Result<bool, Error> {
        self.gateway
            .upsert_service(service)
            .await
            .map_err(|source| Error::UpsertFailed {
                kind: "service",
                name: service.name.clone(),
                source,
            })?;
        self.gateway
            .upsert_route(route)
            .await
            .map_err(|source| Error::UpsertFailed {
                kind: "route",
                name: route.name.clone(),
                source,
            })?;

        let outcomes = self.gateway.bind_middleware(&route.name, chain).await;
        Ok(all_bound(&outcomes))
    }

    async fn prune(&self, registered: &BTreeSet<String>) -> Pruned {
        let mut pruned = Pruned::default();
        let declared = match self.gateway.list_services().await {
            Ok(services) => services,
            Err(error) => {
                error!(%error, "Failed to list gateway services; skipping cleanup");
                return pruned;
            }
        };

        for svc in declared {
            let name = svc.name;
            if registered.contains(&name) || self.statics.contains(&name) || is_reserved(&name) {
                continue;
            }

            match self.gateway.delete_service(&name).await {
                Ok(()) => {
                    info!(service = %name, "Removed stale service");
                    self.metrics.pruned(true);
                    pruned.deleted.insert(name);
                }
                Err(source) => {
                    let error = Error::PruneFailed {
                        name: name.clone(),
                        source,
                    };
                    error!(%error);
                    self.metrics.pruned(false);
                    pruned.failed.insert(name);
                }
            }
        }

        pruned
    }
}
