//! Shared helpers for unit tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use axum::{Router, extract::State, http::StatusCode, routing::get};
use tokio::net::TcpListener;
use url::Url;

use crate::load_balancer::backend::{Backend, BackendId, BackendStatus};
use crate::load_balancer::balancer::LoadBalancer;
use crate::load_balancer::upstream::UpstreamClient;
use crate::registry::BackendRegistry;
use crate::resilience::RetryPolicy;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Serve `app` on an ephemeral port.
pub async fn spawn_backend(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[derive(Clone)]
struct Script {
    statuses: Arc<Vec<u16>>,
    hits: Arc<AtomicUsize>,
}

/// Backend answering `/health` with 200 and every other path with the
/// scripted statuses in turn, repeating the last one.
///
/// The counter only counts non-health requests.
pub async fn scripted_backend(statuses: &[u16]) -> (Url, Arc<AtomicUsize>) {
    let script = Script {
        statuses: Arc::new(statuses.to_vec()),
        hits: Arc::new(AtomicUsize::new(0)),
    };
    let hits = script.hits.clone();

    let app = Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .fallback(|State(script): State<Script>| async move {
            let n = script.hits.fetch_add(1, Ordering::SeqCst);
            let code = script.statuses[n.min(script.statuses.len() - 1)];
            (StatusCode::from_u16(code).unwrap(), format!("response {}", n + 1))
        })
        .with_state(script);

    let addr = spawn_backend(app).await;
    (Url::parse(&format!("http://{}", addr)).unwrap(), hits)
}

/// A backend with a process-unique id.
pub fn backend_at(url: &Url) -> Arc<Backend> {
    let id = BackendId::new(NEXT_ID.fetch_add(1, Ordering::Relaxed)).unwrap();
    Arc::new(Backend::new(id, url.clone(), "/health"))
}

/// Three attempts with millisecond backoff.
pub fn fast_retries() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(10), Duration::ZERO)
}

/// Load balancer over `backends` with nothing marked healthy yet.
pub fn balancer(group: &str, backends: &[Arc<Backend>]) -> LoadBalancer {
    let registry = Arc::new(BackendRegistry::new());
    build(group, &registry, backends)
}

/// Load balancer whose healthy set already holds every backend.
pub async fn healthy_balancer(
    group: &str,
    backends: &[Arc<Backend>],
) -> (LoadBalancer, Arc<BackendRegistry>) {
    let registry = Arc::new(BackendRegistry::new());
    let lb = build(group, &registry, backends);
    mark_healthy(&registry, &lb, backends).await;
    (lb, registry)
}

/// Publish a healthy transition for each backend and wait until `lb` has seen it.
pub async fn mark_healthy(registry: &BackendRegistry, lb: &LoadBalancer, backends: &[Arc<Backend>]) {
    for backend in backends {
        registry
            .update_health(BackendStatus::healthy(backend.id()))
            .await
            .unwrap();
    }
    let expected = backends.len();
    assert!(
        wait_until(Duration::from_secs(2), || lb.healthy_backends().len() == expected).await,
        "load balancer never saw the healthy transitions"
    );
}

/// Poll `check` every 10ms until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn build(group: &str, registry: &Arc<BackendRegistry>, backends: &[Arc<Backend>]) -> LoadBalancer {
    let ids: Vec<BackendId> = backends
        .iter()
        .map(|backend| {
            registry.add_backend(backend.clone());
            backend.id()
        })
        .collect();

    LoadBalancer::builder(group, registry.clone(), UpstreamClient::default())
        .retry_policy(fast_retries())
        .subscribe_to(&ids)
        .build()
        .unwrap()
}
