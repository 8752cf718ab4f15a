//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler
//! - Wire up middleware (tracing, request ID, timeout, rate limiting)
//! - Serve plain HTTP or terminate TLS (HTTP/1.1 and HTTP/2)
//! - Resolve each request to a load balancer and hand it over
//! - Drain in-flight requests on shutdown
//!
//! # Design Decisions
//! - The request deadline cancels the upstream attempts, so an exhausted
//!   budget is reported as a gateway failure (502) instead of a client timeout
//! - `TimeoutLayer` stays outside as a backstop for requests stuck before
//!   forwarding (e.g. a slow request body) and answers 504

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use axum::{
    Router,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware,
    response::Response,
};
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ProxyConfig;
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::http::response::plain_error;
use crate::net::tls::{TlsError, load_tls_config};
use crate::observability::metrics;
use crate::routing::RouteManager;
use crate::security::rate_limit::{self, rate_limit_middleware};

/// Extra time the outer timeout grants after the request deadline.
const DEADLINE_GRACE: Duration = Duration::from_secs(1);

/// Error type for serving.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid bind address `{0}`")]
    BindAddress(String),
    #[error(transparent)]
    Tls(#[from] TlsError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub routes: Arc<RouteManager>,
    pub shutdown: CancellationToken,
    /// Deadline for forwarding one request, retries included.
    pub request_timeout: Duration,
}

/// HTTP front end of the load balancer.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    shutdown: CancellationToken,
}

impl HttpServer {
    /// Create a new HTTP server over already-built routes.
    pub fn new(config: ProxyConfig, routes: Arc<RouteManager>, shutdown: CancellationToken) -> Self {
        let state = AppState {
            routes,
            shutdown: shutdown.clone(),
            request_timeout: config.timeouts.request_timeout(),
        };
        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            shutdown,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let limiter = rate_limit::from_config(&config.rate_limit);
        let backstop = config.timeouts.request_timeout() + DEADLINE_GRACE;

        Router::new()
            .fallback(proxy_handler)
            .with_state(state)
            .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
            .layer(TimeoutLayer::with_status_code(StatusCode::GATEWAY_TIMEOUT, backstop))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id(request.headers()),
                )
            }))
            .layer(set_request_id_layer())
    }

    /// The router, for serving it elsewhere or driving it in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Bind the configured address and serve until shutdown, over TLS when configured.
    pub async fn serve(self) -> Result<(), ServerError> {
        let addr: SocketAddr = self
            .config
            .listener
            .bind_address
            .parse()
            .map_err(|_| ServerError::BindAddress(self.config.listener.bind_address.clone()))?;

        match self.config.listener.tls.clone() {
            Some(tls) => {
                let rustls = load_tls_config(tls.cert_path.as_ref(), tls.key_path.as_ref()).await?;
                self.run_tls(addr, rustls).await?;
            }
            None => {
                let listener = TcpListener::bind(addr).await?;
                self.run(listener).await?;
            }
        }
        Ok(())
    }

    /// Serve plain HTTP on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, tls = false, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let shutdown = self.shutdown.clone();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS on `addr`. ALPN offers HTTP/2 and HTTP/1.1.
    pub async fn run_tls(self, addr: SocketAddr, tls: RustlsConfig) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, tls = true, "HTTP server starting");

        let handle = axum_server::Handle::new();
        let drain = self.config.timeouts.request_timeout();
        let shutdown = self.shutdown.clone();
        let signal = handle.clone();
        tokio::spawn(async move {
            shutdown.cancelled().await;
            signal.graceful_shutdown(Some(drain));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service_with_connect_info::<SocketAddr>())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
/// Looks up the route and lets the group's load balancer do the rest.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let started = Instant::now();
    let path = request.uri().path().to_string();

    let Some((group, lb)) = state.routes.resolve(&path) else {
        tracing::warn!(request_id = %request_id(request.headers()), path = %path, "No route matched");
        metrics::record_request(request.method().as_str(), 404, "none", started);
        return plain_error(StatusCode::NOT_FOUND, "no route for path");
    };

    tracing::debug!(
        request_id = %request_id(request.headers()),
        method = %request.method(),
        path = %path,
        group = %group,
        "Proxying request"
    );

    // Cancelled on client disconnect (handler dropped), shutdown or deadline.
    let cancel = state.shutdown.child_token();
    let _disconnect = cancel.clone().drop_guard();

    let route = lb.route_request(request, &cancel);
    tokio::pin!(route);
    tokio::select! {
        response = &mut route => response,
        _ = tokio::time::sleep(state.request_timeout) => {
            tracing::warn!(
                group = %group,
                path = %path,
                timeout_ms = state.request_timeout.as_millis() as u64,
                "Request deadline reached, abandoning upstream attempts"
            );
            cancel.cancel();
            route.await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ConnectInfo;
    use tower::ServiceExt;

    use crate::config::{BackendConfig, BackendGroupConfig, MatchKind, RouteConfig};
    use crate::http::request::X_REQUEST_ID;
    use crate::lifecycle::build_topology;

    fn config() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.backend_groups.push(BackendGroupConfig {
            id: "api".into(),
            load_balancers: 1,
            backends: vec![BackendConfig {
                url: "http://127.0.0.1:1".into(),
                health_path: "/health".into(),
            }],
        });
        config.routes.push(RouteConfig {
            path: "/api".into(),
            match_kind: MatchKind::Prefix,
            group: "api".into(),
        });
        config
    }

    fn server() -> HttpServer {
        let config = config();
        let topology = build_topology(&config).unwrap();
        HttpServer::new(config, topology.routes, CancellationToken::new())
    }

    fn request(path: &str) -> Request<Body> {
        let mut request = Request::get(path).body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
        request
    }

    #[tokio::test]
    async fn unmatched_path_is_404() {
        let response = server().router().oneshot(request("/other")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"no route for path");
    }

    #[tokio::test]
    async fn group_without_healthy_backends_is_503() {
        let response = server().router().oneshot(request("/api/users")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn request_id_is_generated_or_echoed() {
        let generated = server().router().oneshot(request("/other")).await.unwrap();
        assert!(generated.headers().contains_key(X_REQUEST_ID));

        let mut supplied = request("/other");
        supplied.headers_mut().insert(X_REQUEST_ID, "client-id-1".parse().unwrap());
        let echoed = server().router().oneshot(supplied).await.unwrap();
        assert_eq!(echoed.headers()[X_REQUEST_ID], "client-id-1");
    }
}
