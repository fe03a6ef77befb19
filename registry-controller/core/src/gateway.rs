use crate::{AdminError, Middleware};
use serde::{Deserialize, Serialize};

pub const CONNECT_TIMEOUT_MS: u32 = 60_000;
pub const WRITE_TIMEOUT_MS: u32 = 60_000;
pub const READ_TIMEOUT_MS: u32 = 60_000;
pub const RETRIES: u32 = 3;
pub const PROTOCOL: &str = "http";

/// An upstream definition declared on the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayService {
    pub name: String,
    pub url: String,
    pub connect_timeout: u32,
    pub write_timeout: u32,
    pub read_timeout: u32,
    pub retries: u32,
    pub protocol: String,
}

/// A route declared on the gateway.
///
/// `service` names the owning [`GatewayService`]. It is only sent when the
/// route is created; updates leave the binding untouched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GatewayRoute {
    pub name: String,
    #[serde(skip)]
    pub service: String,
    pub paths: Vec<String>,
    pub methods: Vec<String>,
    pub strip_path: bool,
    pub preserve_host: bool,
}

/// A `{"name": ...}` foreign reference as the admin API expects it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRef {
    pub name: String,
}

/// A plugin instance ready to be bound to a route.
#[derive(Clone, Debug, PartialEq)]
pub struct Plugin {
    pub middleware: Middleware,
    pub name: &'static str,
    pub config: serde_json::Value,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Upserted {
    Created,
    Updated,

    /// A create raced with another writer and the gateway reported a
    /// conflict; the entity is declared, so this counts as success.
    Existing,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Bound {
    Created,

    /// The gateway already had this binding; the call was a no-op.
    AlreadyBound,
}

/// The result of binding one middleware of a chain.
#[derive(Debug)]
pub struct BindOutcome {
    pub middleware: Middleware,
    pub result: Result<Bound, AdminError>,
}

/// Typed access to the gateway's declarative configuration.
///
/// Implementations must make every write idempotent: the controller is never
/// assumed to be the gateway's only writer and any pass may be re-run after a
/// crash.
#[async_trait::async_trait]
pub trait GatewayAdmin: Send + Sync {
    /// Probes the gateway's status endpoint with a short timeout.
    async fn healthy(&self) -> bool;

    async fn upsert_service(&self, service: &GatewayService) -> Result<Upserted, AdminError>;

    async fn upsert_route(&self, route: &GatewayRoute) -> Result<Upserted, AdminError>;

    /// Binds each plugin to `route` in order.
    ///
    /// Every binding is attempted independently; a failure does not roll back
    /// or prevent the others.
    async fn bind_middleware(&self, route: &str, chain: &[Plugin]) -> Vec<BindOutcome>;

    /// Deletes the service's routes and then the service itself.
    async fn delete_service(&self, name: &str) -> Result<(), AdminError>;

    async fn list_services(&self) -> Result<Vec<GatewayService>, AdminError>;
}

// === impl GatewayService ===

impl GatewayService {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            connect_timeout: CONNECT_TIMEOUT_MS,
            write_timeout: WRITE_TIMEOUT_MS,
            read_timeout: READ_TIMEOUT_MS,
            retries: RETRIES,
            protocol: PROTOCOL.to_string(),
        }
    }
}

// === impl NameRef ===

impl NameRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

// === impl BindOutcome ===

impl BindOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// True when every binding in a chain either succeeded or already existed.
pub fn all_bound(outcomes: &[BindOutcome]) -> bool {
    outcomes.iter().all(BindOutcome::is_ok)
}
