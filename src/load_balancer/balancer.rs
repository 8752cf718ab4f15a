//! Per-group load balancer.
//!
//! # Responsibilities
//! - Keep a private healthy set fed by registry health transitions
//! - Select a backend for each request through the configured strategy
//! - Forward the request with bounded, jittered retries
//! - Stream the upstream response back to the client
//!
//! # Design Decisions
//! - One aggregated queue per load balancer: every subscribed backend
//!   publishes into the same sender, so the listener is a single `recv` loop
//! - The listener is the only writer of the healthy set; requests read an
//!   immutable snapshot and never block it
//! - The request body is buffered once so every attempt can replay it
//! - One backend is chosen per request; retries go to the same backend
//! - The streamed response body fails if the backend goes quiet for longer
//!   than the per-attempt timeout

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use arc_swap::ArcSwap;
use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode, header, request::Parts};
use axum::response::Response;
use hyper::body::Incoming;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutBody;

use crate::config::SecurityConfig;
use crate::http::response::{plain_error, strip_hop_by_hop};
use crate::load_balancer::backend::{Backend, BackendId, BackendStatus};
use crate::load_balancer::round_robin::RoundRobin;
use crate::load_balancer::strategy::LoadBalancingStrategy;
use crate::load_balancer::upstream::{ForwardError, UpstreamClient};
use crate::observability::metrics;
use crate::registry::{BackendRegistry, RegistryError, SUBSCRIPTION_BUFFER};
use crate::resilience::{AttemptOutcome, RetryPolicy, classify};

type HealthySnapshot = Arc<ArcSwap<Vec<Arc<Backend>>>>;

/// Dispatcher for one backend group.
#[derive(Debug)]
pub struct LoadBalancer {
    group: String,
    strategy: Box<dyn LoadBalancingStrategy>,
    healthy: HealthySnapshot,
    client: UpstreamClient,
    retry: RetryPolicy,
    max_body_size: usize,
    listener: JoinHandle<()>,
}

/// Builder for [`LoadBalancer`].
#[derive(Debug)]
pub struct LoadBalancerBuilder {
    group: String,
    registry: Arc<BackendRegistry>,
    client: UpstreamClient,
    strategy: Option<Box<dyn LoadBalancingStrategy>>,
    retry: RetryPolicy,
    max_body_size: usize,
    backends: Vec<BackendId>,
}

impl LoadBalancerBuilder {
    /// Selection policy. Round robin when unset.
    pub fn strategy(mut self, strategy: Box<dyn LoadBalancingStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    /// Backends whose health transitions feed the healthy set.
    pub fn subscribe_to(mut self, backends: &[BackendId]) -> Self {
        self.backends.extend_from_slice(backends);
        self
    }

    /// Subscribe to every backend and start the health listener.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn build(self) -> Result<LoadBalancer, RegistryError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER * self.backends.len().max(1));

        let mut members = HashMap::with_capacity(self.backends.len());
        for &id in &self.backends {
            let backend = self
                .registry
                .backend(id)
                .ok_or(RegistryError::UnknownBackend(id))?;
            self.registry.subscribe_with(id, tx.clone())?;
            members.insert(id, backend);
        }
        drop(tx);

        let healthy: HealthySnapshot = Arc::new(ArcSwap::from_pointee(Vec::new()));
        let listener = tokio::spawn(listen(self.group.clone(), members, rx, healthy.clone()));

        tracing::debug!(
            group = %self.group,
            backends = self.backends.len(),
            "Load balancer started"
        );

        Ok(LoadBalancer {
            group: self.group,
            strategy: self.strategy.unwrap_or_else(|| Box::new(RoundRobin::new())),
            healthy,
            client: self.client,
            retry: self.retry,
            max_body_size: self.max_body_size,
            listener,
        })
    }
}

impl LoadBalancer {
    pub fn builder(
        group: impl Into<String>,
        registry: Arc<BackendRegistry>,
        client: UpstreamClient,
    ) -> LoadBalancerBuilder {
        LoadBalancerBuilder {
            group: group.into(),
            registry,
            client,
            strategy: None,
            retry: RetryPolicy::default(),
            max_body_size: SecurityConfig::default().max_body_size,
            backends: Vec::new(),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Current healthy set, ordered by backend id.
    pub fn healthy_backends(&self) -> Arc<Vec<Arc<Backend>>> {
        self.healthy.load_full()
    }

    /// Dispatch one request to a healthy backend of the group.
    ///
    /// Always produces a response: local failures become short plain-text
    /// errors, upstream responses are passed through.
    pub async fn route_request(&self, request: Request<Body>, cancel: &CancellationToken) -> Response {
        let started = Instant::now();
        let method = request.method().clone();

        let candidates = self.healthy.load_full();
        if candidates.is_empty() {
            tracing::warn!(group = %self.group, "No healthy backends");
            metrics::record_request(method.as_str(), 503, "none", started);
            return plain_error(StatusCode::SERVICE_UNAVAILABLE, "no healthy backends available");
        }

        let backend = match self.strategy.next_backend(&candidates) {
            Ok(backend) => backend,
            Err(e) => {
                tracing::warn!(group = %self.group, strategy = self.strategy.name(), error = %e, "Backend selection failed");
                metrics::record_request(method.as_str(), 503, "none", started);
                return plain_error(StatusCode::SERVICE_UNAVAILABLE, "no backend available");
            }
        };

        let (parts, body) = request.into_parts();
        let body = match axum::body::to_bytes(body, self.max_body_size).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(group = %self.group, error = %e, "Failed to buffer request body");
                metrics::record_request(method.as_str(), 413, "none", started);
                return plain_error(StatusCode::PAYLOAD_TOO_LARGE, "request body too large");
            }
        };

        let path_and_query = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
        let target = backend.target_url(path_and_query);

        match self.forward_with_retries(&parts, &body, &target, cancel).await {
            Ok(response) => {
                let status = response.status();
                tracing::info!(
                    group = %self.group,
                    backend = %backend.base(),
                    status = status.as_u16(),
                    latency_ms = started.elapsed().as_millis() as u64,
                    "Request forwarded"
                );
                metrics::record_request(method.as_str(), status.as_u16(), backend.base(), started);

                let (mut head, body) = response.into_parts();
                strip_hop_by_hop(&mut head.headers);
                Response::from_parts(head, Body::new(TimeoutBody::new(self.client.timeout(), body)))
            }
            Err(e) => {
                tracing::warn!(
                    group = %self.group,
                    backend = %backend.base(),
                    status = 502,
                    latency_ms = started.elapsed().as_millis() as u64,
                    error = %e,
                    "Request failed"
                );
                metrics::record_request(method.as_str(), 502, backend.base(), started);
                plain_error(StatusCode::BAD_GATEWAY, "backend request failed")
            }
        }
    }

    /// Run attempts against `target` until one is final or the budget is spent.
    ///
    /// The last attempt's outcome is returned as-is; there is no delay after it.
    async fn forward_with_retries(
        &self,
        parts: &Parts,
        body: &Bytes,
        target: &str,
        cancel: &CancellationToken,
    ) -> Result<Response<Incoming>, ForwardError> {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(ForwardError::Cancelled);
            }

            let request = build_attempt(parts, body, target)?;
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(ForwardError::Cancelled),
                result = self.client.send(request) => result,
            };

            let status = result.as_ref().ok().map(|response| response.status());
            if classify(status) != AttemptOutcome::Retryable || self.retry.is_last(attempt) {
                return result;
            }

            let delay = self.retry.delay(attempt);
            match &result {
                Ok(response) => tracing::warn!(
                    target = %target,
                    attempt = attempt + 1,
                    status = response.status().as_u16(),
                    delay_ms = delay.as_millis() as u64,
                    "Retrying request"
                ),
                Err(e) => tracing::warn!(
                    target = %target,
                    attempt = attempt + 1,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying request after upstream error"
                ),
            }
            metrics::record_retry(&self.group);
            drop(result);

            tokio::select! {
                _ = cancel.cancelled() => return Err(ForwardError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

impl Drop for LoadBalancer {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Copy of the inbound request aimed at `target`, with a fresh body.
fn build_attempt(parts: &Parts, body: &Bytes, target: &str) -> Result<Request<Body>, axum::http::Error> {
    let mut builder = Request::builder().method(parts.method.clone()).uri(target);

    if let Some(headers) = builder.headers_mut() {
        for (name, value) in parts.headers.iter() {
            if name != header::HOST {
                headers.append(name.clone(), value.clone());
            }
        }
        strip_hop_by_hop(headers);
    }

    builder.body(Body::from(body.clone()))
}

/// Health listener: applies every transition to the healthy set.
async fn listen(
    group: String,
    members: HashMap<BackendId, Arc<Backend>>,
    mut updates: mpsc::Receiver<BackendStatus>,
    healthy: HealthySnapshot,
) {
    while let Some(status) = updates.recv().await {
        let Some(backend) = members.get(&status.backend) else {
            tracing::warn!(group = %group, backend = %status.backend, "Health update for a foreign backend");
            continue;
        };

        if apply_status(&healthy, backend, status.is_healthy) {
            tracing::debug!(
                group = %group,
                backend = %backend.base(),
                healthy = status.is_healthy,
                "Healthy set updated"
            );
        }
    }

    tracing::warn!(group = %group, "Health update queue closed, healthy set is now frozen");
}

/// Add or remove a backend. Returns false when the set already agreed.
fn apply_status(healthy: &ArcSwap<Vec<Arc<Backend>>>, backend: &Arc<Backend>, is_healthy: bool) -> bool {
    let current = healthy.load();
    let present = current.iter().any(|b| b.id() == backend.id());

    let next = match (is_healthy, present) {
        (true, false) => {
            let mut next = Vec::clone(&current);
            next.push(backend.clone());
            next.sort_by_key(|b| b.id());
            next
        }
        (false, true) => current
            .iter()
            .filter(|b| b.id() != backend.id())
            .cloned()
            .collect(),
        _ => return false,
    };

    healthy.store(Arc::new(next));
    true
}
