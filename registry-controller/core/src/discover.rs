use crate::{Error, ServiceEndpoint};
use std::{fmt, str::FromStr};

/// Selects which discovery backend a process watches.
///
/// Exactly one backend is active per process.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DiscoveryMode {
    Kubernetes,
    Docker,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid discovery mode {0:?}; expected `kubernetes` or `docker`")]
pub struct InvalidDiscoveryMode(String);

/// Observes a discovery backend and reports its eligible targets.
///
/// Implementations never mutate anything. A target that cannot be processed
/// is logged and dropped; only a backend-wide failure is reported as
/// [`Error::DiscoveryUnavailable`].
#[async_trait::async_trait]
pub trait Discover: Send + Sync {
    fn mode(&self) -> DiscoveryMode;

    async fn discover(&self) -> Result<Vec<ServiceEndpoint>, Error>;
}

// === impl DiscoveryMode ===

impl DiscoveryMode {
    /// Human-readable backend name used in operator-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Kubernetes => "Kubernetes",
            Self::Docker => "Docker",
        }
    }
}

impl fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kubernetes => f.write_str("kubernetes"),
            Self::Docker => f.write_str("docker"),
        }
    }
}

impl FromStr for DiscoveryMode {
    type Err = InvalidDiscoveryMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kubernetes" | "k8s" => Ok(Self::Kubernetes),
            "docker" => Ok(Self::Docker),
            _ => Err(InvalidDiscoveryMode(s.to_string())),
        }
    }
}
