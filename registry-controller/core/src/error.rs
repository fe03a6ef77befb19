use thiserror::Error;

/// A failed call against the gateway's admin API.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("gateway request failed: {0}")]
    Transport(#[source] anyhow::Error),

    #[error("gateway request timed out")]
    Timeout,

    #[error("gateway responded with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid gateway payload: {0}")]
    Json(#[source] serde_json::Error),
}

/// Operational failures of a reconciliation pass.
///
/// None of these are fatal to the process: each is logged and the affected
/// unit (an endpoint, a static proxy, a stale entry, or the whole tick) is
/// retried on the next tick.
#[derive(Debug, Error)]
pub enum Error {
    #[error("discovery backend unavailable: {0}")]
    DiscoveryUnavailable(#[source] anyhow::Error),

    #[error("skipped target {name}: {reason}")]
    TargetSkipped { name: String, reason: String },

    #[error("gateway admin API is unreachable")]
    GatewayUnreachable,

    #[error("failed to upsert {kind} {name}: {source}")]
    UpsertFailed {
        kind: &'static str,
        name: String,
        #[source]
        source: AdminError,
    },

    #[error("failed to prune {name}: {source}")]
    PruneFailed {
        name: String,
        #[source]
        source: AdminError,
    },

    #[error("bootstrap incomplete: {failed} of {total} static proxies failed")]
    BootstrapIncomplete { failed: usize, total: usize },
}

// === impl AdminError ===

impl AdminError {
    /// Network-level failures, as opposed to an answer from the gateway.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// === impl Error ===

impl Error {
    pub fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TargetSkipped {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
