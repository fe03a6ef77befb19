use crate::{Plugin, DEFAULT_METHODS};
use serde_json::json;
use std::{fmt, str::FromStr};

const PLUGIN_TIMEOUT_MS: u32 = 5_000;

const CORS_HEADERS: [&str; 9] = [
    "Accept",
    "Accept-Version",
    "Content-Length",
    "Content-MD5",
    "Content-Type",
    "Date",
    "Authorization",
    "X-Auth-Token",
    "X-Requested-With",
];

const CORS_EXPOSED_HEADERS: [&str; 4] = [
    "X-Subject-ID",
    "X-Subject-Type",
    "X-Is-Super-User",
    "X-Permissions",
];

/// A named gateway plugin that may be bound to a route.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Middleware {
    Cors,
    Auth,
    RequestLogger,
}

/// Builds plugin payloads for each [`Middleware`].
///
/// Built once at startup; the URLs it carries are resolved from configuration
/// and never re-read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MiddlewareCatalog {
    pub auth_service_url: String,
    pub request_logger_url: String,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown middleware: {0}")]
pub struct UnknownMiddleware(String);

// === impl Middleware ===

impl Middleware {
    /// The chain bound to every dynamically discovered endpoint, in order.
    pub const DYNAMIC_CHAIN: [Middleware; 3] = [Self::Cors, Self::Auth, Self::RequestLogger];

    pub fn plugin_name(&self) -> &'static str {
        match self {
            Self::Cors => "cors",
            Self::Auth => "auth",
            Self::RequestLogger => "request-logger",
        }
    }
}

impl fmt::Display for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plugin_name())
    }
}

impl FromStr for Middleware {
    type Err = UnknownMiddleware;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cors" => Ok(Self::Cors),
            "auth" => Ok(Self::Auth),
            "request-logger" => Ok(Self::RequestLogger),
            other => Err(UnknownMiddleware(other.to_string())),
        }
    }
}

// === impl MiddlewareCatalog ===

impl MiddlewareCatalog {
    pub fn plugin(&self, middleware: Middleware) -> Plugin {
        let config = match middleware {
            Middleware::Cors => json!({
                "origins": ["*"],
                "methods": DEFAULT_METHODS,
                "headers": CORS_HEADERS,
                "exposed_headers": CORS_EXPOSED_HEADERS,
                "credentials": true,
                "max_age": 3600,
                "preflight_continue": false,
            }),
            Middleware::Auth => json!({
                "auth_service_url": self.auth_service_url,
                "timeout": PLUGIN_TIMEOUT_MS,
            }),
            Middleware::RequestLogger => json!({
                "service_url": self.request_logger_url,
                "timeout": PLUGIN_TIMEOUT_MS,
            }),
        };

        Plugin {
            middleware,
            name: middleware.plugin_name(),
            config,
        }
    }

    pub fn chain(&self, middlewares: &[Middleware]) -> Vec<Plugin> {
        middlewares.iter().map(|m| self.plugin(*m)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn catalog() -> MiddlewareCatalog {
        MiddlewareCatalog {
            auth_service_url: "http://auth:8001".to_string(),
            request_logger_url: "http://localhost:8002".to_string(),
        }
    }

    #[rstest]
    #[case::cors("cors", Middleware::Cors)]
    #[case::auth("auth", Middleware::Auth)]
    #[case::request_logger("request-logger", Middleware::RequestLogger)]
    fn names_round_trip(#[case] name: &str, #[case] middleware: Middleware) {
        assert_eq!(name.parse::<Middleware>().unwrap(), middleware);
        assert_eq!(middleware.to_string(), name);
    }

    #[test]
    fn unknown_name() {
        assert!("chat-logger".parse::<Middleware>().is_err());
    }

    #[test]
    fn dynamic_chain_preserves_order() {
        let names = catalog()
            .chain(&Middleware::DYNAMIC_CHAIN)
            .into_iter()
            .map(|p| p.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["cors", "auth", "request-logger"]);
    }

    #[test]
    fn auth_plugin_carries_service_url() {
        let plugin = catalog().plugin(Middleware::Auth);
        assert_eq!(
            plugin.config,
            json!({"auth_service_url": "http://auth:8001", "timeout": 5000})
        );
    }

    #[test]
    fn cors_plugin_config() {
        let plugin = catalog().plugin(Middleware::Cors);
        assert_eq!(plugin.config["origins"], json!(["*"]));
        assert_eq!(plugin.config["max_age"], json!(3600));
        assert_eq!(plugin.config["credentials"], json!(true));
        assert_eq!(plugin.config["exposed_headers"].as_array().unwrap().len(), 4);
    }
}
