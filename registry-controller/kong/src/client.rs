use crate::transport::{HttpTransport, Response, Transport};
use http::{Method, StatusCode};
use registry_controller_core::{
    gateway::{CONNECT_TIMEOUT_MS, PROTOCOL, READ_TIMEOUT_MS, RETRIES, WRITE_TIMEOUT_MS},
    AdminError, BindOutcome, Bound, GatewayAdmin, GatewayRoute, GatewayService, NameRef, Plugin,
    Upserted,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A client for the gateway's admin API.
#[derive(Clone, Debug)]
pub struct KongClient<T = HttpTransport> {
    transport: T,
    health_timeout: Duration,
}

/// Whether a named entity is currently declared on the gateway.
#[derive(Debug)]
enum Lookup {
    Found,
    Missing,
    Unknown(AdminError),
}

/// Something that can be upserted by name.
///
/// Services and routes share one upsert algorithm; this captures the handful
/// of ways their endpoints differ.
trait Entity: Serialize + Sync {
    const KIND: &'static str;

    fn name(&self) -> &str;

    fn item_path(&self) -> String;

    fn create_path(&self) -> String;

    fn create_body(&self) -> serde_json::Result<serde_json::Value>;
}

#[derive(Serialize)]
struct RouteCreate<'r> {
    #[serde(flatten)]
    route: &'r GatewayRoute,
    service: NameRef,
}

#[derive(Serialize)]
struct PluginCreate<'p> {
    name: &'static str,
    config: &'p serde_json::Value,
    route: NameRef,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    data: Vec<T>,
    #[serde(default)]
    next: Option<String>,
}

/// A service as the admin API reports it.
#[derive(Debug, Deserialize)]
struct ServiceRecord {
    name: Option<String>,
    protocol: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    path: Option<String>,
    connect_timeout: Option<u32>,
    write_timeout: Option<u32>,
    read_timeout: Option<u32>,
    retries: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RouteRecord {
    id: String,
    name: Option<String>,
}

// === impl KongClient ===

impl KongClient<HttpTransport> {
    pub fn from_url(
        admin_url: &str,
        request_timeout: Duration,
        health_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let transport = HttpTransport::new(admin_url, request_timeout)?;
        Ok(Self::new(transport, health_timeout))
    }
}

impl<T: Transport> KongClient<T> {
    pub fn new(transport: T, health_timeout: Duration) -> Self {
        Self {
            transport,
            health_timeout,
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Response, AdminError> {
        self.transport.send(method, path, body, None).await
    }

    async fn lookup(&self, path: &str) -> Lookup {
        match self.send(Method::GET, path, None).await {
            Ok(rsp) if rsp.status == StatusCode::OK => Lookup::Found,
            Ok(rsp) => {
                debug!(%path, status = %rsp.status, "Not found");
                Lookup::Missing
            }
            Err(error) => Lookup::Unknown(error),
        }
    }

    /// Updates `entity` if the gateway has it, otherwise creates it.
    ///
    /// When the existence check itself fails, a create is attempted and a
    /// conflict is taken to mean the entity already exists.
    async fn upsert<E: Entity>(&self, entity: &E) -> Result<Upserted, AdminError> {
        let item = entity.item_path();
        match self.lookup(&item).await {
            Lookup::Found => {
                let body = serde_json::to_value(entity).map_err(AdminError::Json)?;
                let rsp = self.send(Method::PATCH, &item, Some(body)).await?;
                if !rsp.status.is_success() {
                    return Err(rsp.into_error());
                }
                info!(kind = E::KIND, name = %entity.name(), "Updated");
                Ok(Upserted::Updated)
            }
            Lookup::Missing => self.create(entity).await,
            Lookup::Unknown(error) => {
                warn!(
                    kind = E::KIND,
                    name = %entity.name(),
                    %error,
                    "Existence check failed; attempting create"
                );
                self.create(entity).await
            }
        }
    }

    async fn create<E: Entity>(&self, entity: &E) -> Result<Upserted, AdminError> {
        let body = entity.create_body().map_err(AdminError::Json)?;
        let rsp = self
            .send(Method::POST, &entity.create_path(), Some(body))
            .await?;
        match rsp.status {
            StatusCode::OK | StatusCode::CREATED => {
                info!(kind = E::KIND, name = %entity.name(), "Created");
                Ok(Upserted::Created)
            }
            StatusCode::CONFLICT => {
                debug!(kind = E::KIND, name = %entity.name(), "Already exists");
                Ok(Upserted::Existing)
            }
            _ => Err(rsp.into_error()),
        }
    }

    async fn bind(&self, route: &str, plugin: &Plugin) -> Result<Bound, AdminError> {
        let body = serde_json::to_value(PluginCreate {
            name: plugin.name,
            config: &plugin.config,
            route: NameRef::new(route),
        })
        .map_err(AdminError::Json)?;
        let rsp = self.send(Method::POST, "/plugins", Some(body)).await?;
        match rsp.status {
            StatusCode::OK | StatusCode::CREATED => Ok(Bound::Created),
            StatusCode::CONFLICT => Ok(Bound::AlreadyBound),
            _ => Err(rsp.into_error()),
        }
    }

    async fn delete_routes_of(&self, service: &str) {
        let path = format!("/services/{service}/routes");
        let routes = match self.get_json::<Page<RouteRecord>>(&path).await {
            Ok(page) => page.data,
            Err(error) => {
                warn!(%service, %error, "Failed to list routes");
                return;
            }
        };

        for route in routes {
            let name = route.name.as_deref().unwrap_or(&route.id);
            let path = format!("/routes/{}", route.id);
            match self.send(Method::DELETE, &path, None).await {
                Ok(rsp) if is_deleted(rsp.status) => {
                    info!(%service, route = %name, "Deleted route")
                }
                Ok(rsp) => warn!(
                    %service,
                    route = %name,
                    status = %rsp.status,
                    body = %rsp.text(),
                    "Failed to delete route"
                ),
                Err(error) => warn!(%service, route = %name, %error, "Failed to delete route"),
            }
        }
    }

    async fn get_json<D: serde::de::DeserializeOwned>(&self, path: &str) -> Result<D, AdminError> {
        let rsp = self.send(Method::GET, path, None).await?;
        if rsp.status != StatusCode::OK {
            return Err(rsp.into_error());
        }
        serde_json::from_slice(&rsp.body).map_err(AdminError::Json)
    }
}

#[async_trait::async_trait]
impl<T: Transport> GatewayAdmin for KongClient<T> {
    async fn healthy(&self) -> bool {
        match self
            .transport
            .send(Method::GET, "/status", None, Some(self.health_timeout))
            .await
        {
            Ok(rsp) if rsp.status == StatusCode::OK => true,
            Ok(rsp) => {
                warn!(status = %rsp.status, "Gateway status probe failed");
                false
            }
            Err(error) => {
                warn!(%error, "Gateway status probe failed");
                false
            }
        }
    }

    async fn upsert_service(&self, service: &GatewayService) -> Result<Upserted, AdminError> {
        self.upsert(service).await
    }

    async fn upsert_route(&self, route: &GatewayRoute) -> Result<Upserted, AdminError> {
        self.upsert(route).await
    }

    async fn bind_middleware(&self, route: &str, chain: &[Plugin]) -> Vec<BindOutcome> {
        let mut outcomes = Vec::with_capacity(chain.len());
        for plugin in chain {
            let result = self.bind(route, plugin).await;
            match &result {
                Ok(Bound::Created) => {
                    info!(%route, middleware = %plugin.middleware, "Bound middleware")
                }
                Ok(Bound::AlreadyBound) => {
                    debug!(%route, middleware = %plugin.middleware, "Already bound")
                }
                Err(error) => {
                    warn!(%route, middleware = %plugin.middleware, %error, "Failed to bind")
                }
            }
            outcomes.push(BindOutcome {
                middleware: plugin.middleware,
                result,
            });
        }
        outcomes
    }

    async fn delete_service(&self, name: &str) -> Result<(), AdminError> {
        // The gateway refuses to delete a service that still has routes. If
        // some route survives, the delete below fails and is retried next tick.
        self.delete_routes_of(name).await;

        let rsp = self
            .send(Method::DELETE, &format!("/services/{name}"), None)
            .await?;
        if !is_deleted(rsp.status) {
            return Err(rsp.into_error());
        }
        info!(service = %name, "Deleted service");
        Ok(())
    }

    async fn list_services(&self) -> Result<Vec<GatewayService>, AdminError> {
        let mut services = Vec::new();
        let mut path = "/services".to_string();
        loop {
            let page = self.get_json::<Page<ServiceRecord>>(&path).await?;
            services.extend(page.data.into_iter().filter_map(ServiceRecord::into_service));
            let next = match page.next.as_deref().filter(|n| !n.is_empty()) {
                Some(next) => self.transport.path_of(next).to_string(),
                None => break,
            };
            if next == path {
                break;
            }
            path = next;
        }
        Ok(services)
    }
}

fn is_deleted(status: StatusCode) -> bool {
    status == StatusCode::NO_CONTENT || status == StatusCode::OK || status == StatusCode::NOT_FOUND
}

// === impl Entity ===

impl Entity for GatewayService {
    const KIND: &'static str = "service";

    fn name(&self) -> &str {
        &self.name
    }

    fn item_path(&self) -> String {
        format!("/services/{}", self.name)
    }

    fn create_path(&self) -> String {
        "/services".to_string()
    }

    fn create_body(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

impl Entity for GatewayRoute {
    const KIND: &'static str = "route";

    fn name(&self) -> &str {
        &self.name
    }

    fn item_path(&self) -> String {
        format!("/routes/{}", self.name)
    }

    fn create_path(&self) -> String {
        format!("/services/{}/routes", self.service)
    }

    fn create_body(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(RouteCreate {
            route: self,
            service: NameRef::new(&self.service),
        })
    }
}

// === impl ServiceRecord ===

impl ServiceRecord {
    /// Unnamed services cannot be matched against desired state and are
    /// ignored.
    fn into_service(self) -> Option<GatewayService> {
        let name = self.name?;
        let url = format!(
            "{}://{}:{}{}",
            self.protocol.as_deref().unwrap_or(PROTOCOL),
            self.host.unwrap_or_default(),
            self.port.unwrap_or(80),
            self.path.unwrap_or_default(),
        );
        Some(GatewayService {
            name,
            url,
            connect_timeout: self.connect_timeout.unwrap_or(CONNECT_TIMEOUT_MS),
            write_timeout: self.write_timeout.unwrap_or(WRITE_TIMEOUT_MS),
            read_timeout: self.read_timeout.unwrap_or(READ_TIMEOUT_MS),
            retries: self.retries.unwrap_or(RETRIES),
            protocol: self.protocol.unwrap_or_else(|| PROTOCOL.to_string()),
        })
    }
}
