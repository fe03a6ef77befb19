#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod discover;
pub mod endpoint;
mod error;
pub mod gateway;
pub mod middleware;
pub mod static_proxy;

pub use self::{
    discover::{Discover, DiscoveryMode},
    endpoint::ServiceEndpoint,
    error::{AdminError, Error},
    gateway::{
        BindOutcome, Bound, GatewayAdmin, GatewayRoute, GatewayService, NameRef, Plugin, Upserted,
    },
    middleware::{Middleware, MiddlewareCatalog},
    static_proxy::{StaticProxyConfig, StaticProxyOverrides, StaticProxyRegistry},
};

/// Methods exposed on every route unless a target says otherwise.
pub const DEFAULT_METHODS: [&str; 6] = ["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS"];

/// Gateway-owned service names that are never garbage-collected.
pub const RESERVED_NAMES: [&str; 4] = ["kong", "postgres", "konga", "registry"];

/// Returns the route name paired with `service`.
///
/// The gateway does not enforce the pairing; it exists purely by naming
/// convention, so every component must derive route names through here.
pub fn route_name(service: &str) -> String {
    format!("{service}-route")
}

pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

pub(crate) fn default_methods() -> Vec<String> {
    DEFAULT_METHODS.iter().map(|m| m.to_string()).collect()
}
