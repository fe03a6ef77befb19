use bytes::Bytes;
use chrono::Utc;
use http::{header, Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::{server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use prometheus_client::registry::Registry;
use registry_controller_core::{DiscoveryMode, GatewayAdmin};
use registry_controller_reconcile::{Reconciler, RegistryState, SharedReconciler};
use serde_json::json;
use std::{convert::Infallible, net::SocketAddr, sync::Arc};
use tokio::{
    net::TcpListener,
    sync::{watch, Mutex},
};
use tracing::{debug, error, info, instrument, warn};

const OPENMETRICS: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// The operator-facing HTTP surface.
///
/// Reads go to the state published by the last completed tick; `POST /sync`
/// takes the reconciler lock and so waits for an in-flight tick.
#[derive(Clone)]
pub(crate) struct ControlSurface {
    reconciler: SharedReconciler,
    state: watch::Receiver<Arc<RegistryState>>,
    gateway: Arc<dyn GatewayAdmin>,
    mode: DiscoveryMode,
    prom: Arc<Registry>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Route {
    Health,
    Status,
    Services,
    Sync,
    Metrics,
}

// === impl ControlSurface ===

impl ControlSurface {
    pub(crate) fn new(
        reconciler: Reconciler,
        gateway: Arc<dyn GatewayAdmin>,
        prom: Registry,
    ) -> Self {
        Self {
            state: reconciler.subscribe(),
            mode: reconciler.mode(),
            reconciler: Arc::new(Mutex::new(reconciler)),
            gateway,
            prom: Arc::new(prom),
        }
    }

    pub(crate) fn reconciler(&self) -> SharedReconciler {
        self.reconciler.clone()
    }

    pub(crate) async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>> {
        let route = match Route::from_path(req.uri().path()) {
            Some(route) => route,
            None => return empty(StatusCode::NOT_FOUND),
        };
        if !route.allows(req.method()) {
            return empty(StatusCode::METHOD_NOT_ALLOWED);
        }

        match route {
            Route::Health => json_response(
                StatusCode::OK,
                json!({
                    "status": "healthy",
                    "timestamp": Utc::now().timestamp_millis() as f64 / 1000.0,
                }),
            ),
            Route::Status => self.status().await,
            Route::Services => {
                let state = self.state.borrow().clone();
                json_response(
                    StatusCode::OK,
                    json!({ "services": state.names().collect::<Vec<_>>() }),
                )
            }
            Route::Sync => self.sync().await,
            Route::Metrics => self.metrics(),
        }
    }

    async fn status(&self) -> Response<Full<Bytes>> {
        let state = self.state.borrow().clone();
        let gateway_ok = self.gateway.healthy().await;
        json_response(
            StatusCode::OK,
            json!({
                "status": if gateway_ok { "healthy" } else { "degraded" },
                "services_count": state.len(),
                "last_sync": state.last_sync_display(),
                "gateway_status": if gateway_ok { "healthy" } else { "unhealthy" },
            }),
        )
    }

    async fn sync(&self) -> Response<Full<Bytes>> {
        let mut reconciler = self.reconciler.lock().await;
        match reconciler.sync().await {
            Ok(registered) => json_response(
                StatusCode::OK,
                json!({
                    "message": format!(
                        "Sync completed. Registered {registered} {} services.",
                        self.mode.label()
                    ),
                    "registered": registered,
                }),
            ),
            Err(error) => {
                error!(%error, "Manual sync failed");
                json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "detail": error.to_string() }),
                )
            }
        }
    }

    fn metrics(&self) -> Response<Full<Bytes>> {
        let mut buf = String::new();
        if let Err(error) = prometheus_client::encoding::text::encode(&mut buf, &self.prom) {
            warn!(%error, "Failed to encode metrics");
            return empty(StatusCode::INTERNAL_SERVER_ERROR);
        }
        response(StatusCode::OK, OPENMETRICS, buf.into())
    }
}

// === impl Route ===

impl Route {
    fn from_path(path: &str) -> Option<Self> {
        match path {
            "/health" => Some(Self::Health),
            "/status" => Some(Self::Status),
            "/services" => Some(Self::Services),
            "/sync" => Some(Self::Sync),
            "/metrics" => Some(Self::Metrics),
            _ => None,
        }
    }

    fn allows(&self, method: &Method) -> bool {
        match self {
            Self::Sync => method == Method::POST,
            _ => method == Method::GET || method == Method::HEAD,
        }
    }
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    response(status, "application/json", body.to_string().into())
}

fn empty(status: StatusCode) -> Response<Full<Bytes>> {
    let mut rsp = Response::new(Full::default());
    *rsp.status_mut() = status;
    rsp
}

fn response(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<Full<Bytes>> {
    let mut rsp = Response::new(Full::new(body));
    *rsp.status_mut() = status;
    rsp.headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static(content_type));
    rsp
}

/// Serves the control surface until shutdown is signaled.
///
/// Open connections are closed gracefully; each holds the drain handle until
/// its in-flight request has been answered.
#[instrument(skip_all, fields(%addr))]
pub(crate) async fn serve(
    addr: SocketAddr,
    surface: ControlSurface,
    drain: kubert::shutdown::Watch,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Control surface listening");

    let shutdown = drain.clone().signaled();
    tokio::pin!(shutdown);
    loop {
        let (stream, client) = tokio::select! {
            _release = &mut shutdown => {
                debug!("Closing listener");
                return Ok(());
            }
            accepted = listener.accept() => accepted?,
        };

        let surface = surface.clone();
        let drain = drain.clone();
        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let surface = surface.clone();
                async move { Ok::<_, Infallible>(surface.handle(req).await) }
            });
            let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), svc);
            tokio::pin!(conn);

            let res = tokio::select! {
                res = &mut conn => res,
                release = drain.signaled() => {
                    conn.as_mut().graceful_shutdown();
                    let res = conn.await;
                    drop(release);
                    res
                }
            };
            if let Err(error) = res {
                debug!(%client, %error, "Connection closed");
            }
        });
    }
}
