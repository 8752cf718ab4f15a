//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use axum::http::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use l7lb::config::ProxyConfig;
use l7lb::http::HttpServer;
use l7lb::lifecycle::{Shutdown, build_topology};
use l7lb::routing::RouteManager;

/// Handle on a running mock backend.
#[derive(Clone)]
pub struct MockBackend {
    pub addr: SocketAddr,
    /// Requests other than health probes.
    pub hits: Arc<AtomicUsize>,
    /// Health probes answered.
    pub probes: Arc<AtomicUsize>,
    /// Whether `/health` answers 200 (otherwise 503).
    pub healthy: Arc<AtomicBool>,
}

impl MockBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

/// Start a simple mock backend that returns a fixed response.
pub async fn start_mock_backend(response: &'static str) -> MockBackend {
    start_programmable_backend(move |_| async move { (200, response.to_string()) }).await
}

/// Start a programmable mock backend on an ephemeral port.
///
/// `f` gets the 0-based index of each non-health request.
pub async fn start_programmable_backend<F, Fut>(f: F) -> MockBackend
where
    F: Fn(usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = MockBackend {
        addr: listener.local_addr().unwrap(),
        hits: Arc::new(AtomicUsize::new(0)),
        probes: Arc::new(AtomicUsize::new(0)),
        healthy: Arc::new(AtomicBool::new(true)),
    };
    let f = Arc::new(f);
    let state = backend.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let f = f.clone();
                    let state = state.clone();
                    tokio::spawn(async move {
                        let _ = handle(socket, state, f).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    backend
}

async fn handle<F, Fut>(mut socket: TcpStream, state: MockBackend, f: Arc<F>) -> std::io::Result<()>
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = (u16, String)>,
{
    let Some(path) = read_request_path(&mut socket).await? else {
        return Ok(());
    };

    let (status, body) = if path == "/health" {
        state.probes.fetch_add(1, Ordering::SeqCst);
        if state.healthy.load(Ordering::SeqCst) {
            (200, "OK".to_string())
        } else {
            (503, "down".to_string())
        }
    } else {
        let n = state.hits.fetch_add(1, Ordering::SeqCst);
        f(n).await
    };

    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

/// Read the request head and return the path of the request line.
async fn read_request_path(socket: &mut TcpStream) -> std::io::Result<Option<String>> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let head = String::from_utf8_lossy(&buf);
    let target = head.split_whitespace().nth(1).unwrap_or("/");
    let path = target.split('?').next().unwrap_or("/");
    Ok(Some(path.to_string()))
}

/// Config routing every path to one group, with fast probes and retries.
pub fn config_for(backends: &[&MockBackend]) -> ProxyConfig {
    let config = format!(
        r#"
        [[routes]]
        path = "/"
        match = "prefix"
        group = "web"

        [[backend_groups]]
        id = "web"
        backends = [{}]

        [health_check]
        healthy_frequency_ms = 50
        unhealthy_frequency_ms = 50
        timeout_ms = 500
        workers = 2

        [retries]
        max_attempts = 3
        base_delay_ms = 10
        max_jitter_ms = 5
        "#,
        backends
            .iter()
            .map(|b| format!("{{ url = \"{}\" }}", b.url()))
            .collect::<Vec<_>>()
            .join(", ")
    );
    l7lb::config::parse_config(&config).unwrap()
}

/// A load balancer process running in the test runtime.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    routes: Arc<RouteManager>,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Wait until the group serving `path` has exactly `n` healthy backends.
    pub async fn wait_healthy(&self, path: &str, n: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Some((_, lb)) = self.routes.resolve(path) {
                if lb.healthy_backends().len() == n {
                    return;
                }
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "group never reached {} healthy backends",
                n
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Build the topology, start health checks and serve on an ephemeral port.
pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let topology = build_topology(&config).unwrap();
    topology.health_checker.start(shutdown.subscribe());
    let routes = topology.routes.clone();

    let server = HttpServer::new(config, topology.routes, shutdown.token());
    tokio::spawn(async move {
        let _ = server.run(listener).await;
    });

    TestProxy {
        addr,
        shutdown,
        routes,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
