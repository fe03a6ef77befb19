use crate::admin::{self, ControlSurface};
use anyhow::{anyhow, bail, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use registry_controller_core::{
    Discover, DiscoveryMode, GatewayAdmin, MiddlewareCatalog, StaticProxyOverrides,
    StaticProxyRegistry,
};
use registry_controller_docker::{DockerDiscovery, Eligibility};
use registry_controller_k8s::KubernetesDiscovery;
use registry_controller_kong::KongClient;
use registry_controller_reconcile::{ReconcileMetrics, Reconciler};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing::{error, info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "registry-controller",
    about = "Registers discovered agent services with the API gateway"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "registry_controller=info,warn",
        env = "REGISTRY_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain", env = "REGISTRY_CONTROLLER_LOG_FORMAT")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    /// Where agents are discovered: `kubernetes` (or `k8s`) or `docker`.
    #[clap(long, default_value = "kubernetes", env = "DISCOVERY_MODE")]
    discovery_mode: DiscoveryMode,

    /// The only namespace searched for agent services.
    #[clap(long, default_value = "agents", env = "AGENTS_NAMESPACE")]
    agents_namespace: String,

    /// Namespace of the platform services behind the static proxies.
    #[clap(long, default_value = "platform", env = "PLATFORM_NAMESPACE")]
    platform_namespace: String,

    /// The container network searched for agent containers.
    #[clap(long, default_value = "agents-net", env = "AGENTS_NETWORK")]
    agents_network: String,

    #[clap(long, default_value = "agent-", env = "AGENT_PREFIX")]
    agent_prefix: String,

    /// Container port an agent must expose.
    #[clap(long, default_value = "5000", env = "AGENT_PORT")]
    agent_port: u16,

    #[clap(
        long,
        default_value = "http://kong-gateway:8001",
        env = "GATEWAY_ADMIN_URL"
    )]
    gateway_admin_url: String,

    #[clap(
        long,
        default_value = "30s",
        env = "REGISTRY_INTERVAL",
        value_parser = parse_duration
    )]
    interval: Duration,

    #[clap(
        long,
        default_value = "10s",
        env = "GATEWAY_REQUEST_TIMEOUT",
        value_parser = parse_duration
    )]
    request_timeout: Duration,

    #[clap(
        long,
        default_value = "5s",
        env = "GATEWAY_HEALTH_TIMEOUT",
        value_parser = parse_duration
    )]
    health_timeout: Duration,

    #[clap(
        long,
        default_value = "10s",
        env = "DISCOVERY_TIMEOUT",
        value_parser = parse_duration
    )]
    discovery_timeout: Duration,

    #[clap(long, default_value = "0.0.0.0:8080", env = "REGISTRY_ADMIN_ADDR")]
    admin_addr: SocketAddr,

    #[clap(long, env = "GATEWAY_BACKEND_HOST")]
    backend_host: Option<String>,

    #[clap(long, env = "GATEWAY_WEB_HOST")]
    web_host: Option<String>,

    /// Mount point of the web app.
    #[clap(long, env = "GATEWAY_WEB_PATH")]
    web_path: Option<String>,

    #[clap(long, env = "GATEWAY_AUTH_HOST")]
    auth_host: Option<String>,

    #[clap(long, env = "GATEWAY_ROUTER_HOST")]
    router_host: Option<String>,

    #[clap(long, env = "GATEWAY_LANDING_HOST")]
    landing_host: Option<String>,

    #[clap(long, env = "GATEWAY_N8N_HOST")]
    n8n_host: Option<String>,

    /// Token validation endpoint used by the auth middleware. Defaults to the
    /// resolved auth host on `--auth-port`.
    #[clap(long, env = "GATEWAY_AUTH_SERVICE_URL")]
    auth_service_url: Option<String>,

    #[clap(long, default_value = "8001", env = "GATEWAY_AUTH_PORT")]
    auth_port: u16,

    #[clap(long, env = "GATEWAY_REQUEST_LOGGER_URL")]
    request_logger_url: Option<String>,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            discovery_mode: mode,
            agents_namespace,
            platform_namespace,
            agents_network,
            agent_prefix,
            agent_port,
            gateway_admin_url,
            interval,
            request_timeout,
            health_timeout,
            discovery_timeout,
            admin_addr,
            backend_host,
            web_host,
            web_path,
            auth_host,
            router_host,
            landing_host,
            n8n_host,
            auth_service_url,
            auth_port,
            request_logger_url,
        } = self;

        log_format.try_init(log_level)?;
        let (shutdown, watch) = kubert::shutdown::sigint_or_sigterm()?;

        let discover: Arc<dyn Discover> = match mode {
            DiscoveryMode::Kubernetes => {
                let client = client.try_client().await?;
                Arc::new(KubernetesDiscovery::new(
                    client,
                    agents_namespace,
                    discovery_timeout,
                ))
            }
            DiscoveryMode::Docker => Arc::new(DockerDiscovery::connect(
                agents_network,
                Eligibility {
                    prefix: agent_prefix,
                    port: agent_port,
                },
                discovery_timeout,
            )?),
        };

        let overrides = StaticProxyOverrides {
            backend_host,
            web_host,
            web_path,
            auth_host,
            router_host,
            landing_host,
            n8n_host,
        };
        let statics = StaticProxyRegistry::resolve(mode, &platform_namespace, &overrides);
        let catalog = MiddlewareCatalog {
            auth_service_url: auth_service_url.unwrap_or_else(|| {
                format!(
                    "http://{}:{}",
                    overrides.auth_host(mode, &platform_namespace),
                    auth_port
                )
            }),
            request_logger_url: request_logger_url
                .unwrap_or_else(|| default_request_logger_url(mode).to_string()),
        };

        let gateway: Arc<dyn GatewayAdmin> = Arc::new(KongClient::from_url(
            &gateway_admin_url,
            request_timeout,
            health_timeout,
        )?);

        let mut prom = Registry::with_prefix("registry");
        let metrics = ReconcileMetrics::register(prom.sub_registry_with_prefix("reconcile"));

        let reconciler = Reconciler::new(discover, gateway.clone(), statics, catalog, metrics);
        let surface = ControlSurface::new(reconciler, gateway, prom);

        info!(%mode, gateway = %gateway_admin_url, ?interval, "Starting");
        tokio::spawn(
            registry_controller_reconcile::run(
                surface.reconciler(),
                interval,
                watch.clone().signaled(),
            )
            .instrument(info_span!("scheduler")),
        );
        tokio::spawn(
            async move {
                if let Err(error) = admin::serve(admin_addr, surface, watch).await {
                    error!(%error, "Control surface failed");
                }
            }
            .instrument(info_span!("admin")),
        );

        // Block the main thread on the shutdown signal. Once it fires, wait for
        // the in-flight tick and open connections to finish.
        if shutdown.signaled().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

fn default_request_logger_url(mode: DiscoveryMode) -> &'static str {
    match mode {
        // The request logger runs as a sidecar of the gateway.
        DiscoveryMode::Kubernetes => "http://localhost:8002",
        DiscoveryMode::Docker => "http://chat-history:8002",
    }
}

/// Parses a duration like `500ms`, `30s`, `5m`, `1h` or `1d`.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let (magnitude, unit) = if let Some(offset) = s.rfind(|c: char| c.is_ascii_digit()) {
        let (magnitude, unit) = s.split_at(offset + 1);
        (magnitude.parse::<u64>()?, unit)
    } else {
        bail!("{s} does not contain a duration value");
    };

    let mul = match unit {
        "" if magnitude == 0 => 0,
        "ms" => 1,
        "s" => 1000,
        "m" => 1000 * 60,
        "h" => 1000 * 60 * 60,
        "d" => 1000 * 60 * 60 * 24,
        _ => bail!("invalid duration unit {unit} (expected one of 'ms', 's', 'm', 'h', or 'd')"),
    };

    let ms = magnitude
        .checked_mul(mul)
        .ok_or_else(|| anyhow!("duration {s} overflows when converted to 'ms'"))?;
    Ok(Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("0", Duration::ZERO)]
    #[case("250ms", Duration::from_millis(250))]
    #[case("30s", Duration::from_secs(30))]
    #[case(" 5m ", Duration::from_secs(300))]
    #[case("1h", Duration::from_secs(3600))]
    #[case("2d", Duration::from_secs(2 * 24 * 3600))]
    fn parses_durations(#[case] input: &str, #[case] expected: Duration) {
        assert_eq!(parse_duration(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("s")]
    #[case("10")]
    #[case("10y")]
    #[case("18446744073709551615d")]
    fn rejects_bad_durations(#[case] input: &str) {
        assert!(parse_duration(input).is_err());
    }

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["registry-controller"]).unwrap();
        assert_eq!(args.discovery_mode, DiscoveryMode::Kubernetes);
        assert_eq!(args.interval, Duration::from_secs(30));
        assert_eq!(args.agent_port, 5000);
        assert_eq!(args.gateway_admin_url, "http://kong-gateway:8001");
        assert_eq!(args.web_path, None);
    }

    #[test]
    fn mode_aliases() {
        let args =
            Args::try_parse_from(["registry-controller", "--discovery-mode", "k8s"]).unwrap();
        assert_eq!(args.discovery_mode, DiscoveryMode::Kubernetes);
        let args =
            Args::try_parse_from(["registry-controller", "--discovery-mode", "docker"]).unwrap();
        assert_eq!(args.discovery_mode, DiscoveryMode::Docker);
        assert!(
            Args::try_parse_from(["registry-controller", "--discovery-mode", "nomad"]).is_err()
        );
    }
}
