//! Active health checking.
//!
//! # Responsibilities
//! - Probe backends from a shared work queue with a fixed pool of workers
//! - Detect health transitions and publish them to the registry
//! - Reschedule each backend at the cadence of its current state
//!
//! # Design Decisions
//! - The queue is both the work list and the fairness mechanism: a backend
//!   is in it at most once, and goes back in after its delay elapses
//! - Delays run on their own timer tasks so a sleeping backend never holds
//!   a worker
//! - New backends start unhealthy and are probed at once
//! - Adding a backend twice is a no-op; it is scheduled once

use std::collections::HashSet;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::HealthCheckConfig;
use crate::health::state::{HealthState, HealthySet};
use crate::load_balancer::backend::{Backend, BackendId, BackendStatus};
use crate::load_balancer::upstream::UpstreamClient;
use crate::observability::metrics;
use crate::registry::BackendRegistry;

const USER_AGENT: &str = "l7lb-health-check";

/// Probe bodies are drained so the connection can go back to the pool.
const PROBE_BODY_LIMIT: usize = 64 * 1024;

/// Worker pool probing backends and publishing edge-triggered transitions.
#[derive(Debug, Clone)]
pub struct HealthChecker {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    client: UpstreamClient,
    registry: Arc<BackendRegistry>,
    healthy: HealthySet,
    healthy_frequency: Duration,
    unhealthy_frequency: Duration,
    workers: usize,
    scheduled: std::sync::Mutex<HashSet<BackendId>>,
    queue_tx: mpsc::UnboundedSender<Arc<Backend>>,
    queue_rx: Mutex<mpsc::UnboundedReceiver<Arc<Backend>>>,
}

impl HealthChecker {
    /// Create a checker. Probes reuse `client`'s pool with the probe timeout.
    pub fn new(
        config: &HealthCheckConfig,
        client: UpstreamClient,
        registry: Arc<BackendRegistry>,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        Self {
            inner: Arc::new(Inner {
                client: client.with_timeout(config.timeout()),
                registry,
                healthy: HealthySet::new(),
                healthy_frequency: config.healthy_frequency(),
                unhealthy_frequency: config.unhealthy_frequency(),
                workers: config.workers.max(1),
                scheduled: std::sync::Mutex::new(HashSet::new()),
                queue_tx,
                queue_rx: Mutex::new(queue_rx),
            }),
        }
    }

    /// Enqueue a backend for checking. It is considered unhealthy until a probe succeeds.
    ///
    /// Returns false if the backend was already added.
    pub fn add_backend(&self, backend: Arc<Backend>) -> bool {
        let mut scheduled = self.inner.scheduled.lock().unwrap_or_else(PoisonError::into_inner);
        if !scheduled.insert(backend.id()) {
            tracing::debug!(backend = %backend.id(), "Backend already under health checks");
            return false;
        }
        drop(scheduled);

        tracing::debug!(backend = %backend.id(), url = %backend.url(), "Backend added to health checks");
        if let Err(e) = self.inner.queue_tx.send(backend) {
            tracing::error!(backend = %e.0.id(), "Health check queue closed, backend not scheduled");
            return false;
        }
        true
    }

    /// Whether the checker currently considers the backend healthy.
    pub async fn is_healthy(&self, backend: &Backend) -> bool {
        self.inner.healthy.contains(backend.url().as_str()).await
    }

    /// Spawn the workers. They stop when `shutdown` is cancelled.
    pub fn start(&self, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        tracing::info!(
            workers = self.inner.workers,
            healthy_frequency_ms = self.inner.healthy_frequency.as_millis() as u64,
            unhealthy_frequency_ms = self.inner.unhealthy_frequency.as_millis() as u64,
            "Health checker starting"
        );

        (0..self.inner.workers)
            .map(|worker| {
                let inner = self.inner.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { inner.run_worker(worker, shutdown).await })
            })
            .collect()
    }
}

impl Inner {
    async fn run_worker(self: Arc<Self>, worker: usize, shutdown: CancellationToken) {
        loop {
            let backend = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = self.next_job() => match next {
                    Some(backend) => backend,
                    None => break,
                },
            };

            let observed = HealthState::from_probe(self.probe(&backend).await);
            let state = self.evaluate(&backend, observed).await;
            self.reschedule(backend, state, &shutdown);
        }
        tracing::debug!(worker, "Health check worker stopped");
    }

    async fn next_job(&self) -> Option<Arc<Backend>> {
        self.queue_rx.lock().await.recv().await
    }

    /// One GET against the health endpoint. Healthy only on exactly 200.
    async fn probe(&self, backend: &Backend) -> bool {
        let url = backend.health_url();
        let request = match Request::get(url.as_str())
            .header(header::USER_AGENT, USER_AGENT)
            .body(Body::empty())
        {
            Ok(request) => request,
            Err(e) => {
                tracing::error!(url = %url, error = %e, "Failed to build health check request");
                return false;
            }
        };

        match self.client.send(request).await {
            Ok(response) => {
                let status = response.status();
                let body = Body::new(response.into_body());
                let _ = tokio::time::timeout(
                    self.client.timeout(),
                    axum::body::to_bytes(body, PROBE_BODY_LIMIT),
                )
                .await;

                if status != StatusCode::OK {
                    tracing::debug!(url = %url, status = %status, "Health check failed: unexpected status");
                }
                status == StatusCode::OK
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Health check failed");
                false
            }
        }
    }

    /// Compare the observation with the healthy set and publish a transition if it differs.
    ///
    /// The lock is held until the registry has accepted the transition.
    async fn evaluate(&self, backend: &Backend, observed: HealthState) -> HealthState {
        let key = backend.url().as_str();
        let mut members = self.healthy.lock().await;

        if let Some(state) = members.apply(key, observed) {
            tracing::info!(
                backend = %backend.id(),
                url = %key,
                healthy = state.is_healthy(),
                "Backend health changed"
            );
            metrics::record_health_transition(key, state.is_healthy());

            let status = BackendStatus::new(backend.id(), state.is_healthy());
            if let Err(e) = self.registry.update_health(status).await {
                tracing::error!(backend = %backend.id(), error = %e, "Failed to publish health transition");
            }
        }
        drop(members);

        metrics::record_backend_health(key, observed.is_healthy());
        observed
    }

    fn reschedule(&self, backend: Arc<Backend>, state: HealthState, shutdown: &CancellationToken) {
        let delay = match state {
            HealthState::Healthy => self.healthy_frequency,
            HealthState::Unhealthy => self.unhealthy_frequency,
        };
        let queue = self.queue_tx.clone();
        let shutdown = shutdown.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = queue.send(backend) {
                        tracing::debug!(backend = %e.0.id(), "Health check queue closed, dropping backend");
                    }
                }
            }
        });
    }
}
