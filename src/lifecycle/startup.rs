//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the runtime topology from a validated configuration
//! - Wire registry, load balancers, routing table, routes and health checker
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Every component is constructed here and injected; nothing is global
//! - Backends start unhealthy; traffic flows once the first probes succeed

use std::sync::Arc;
use url::Url;

use crate::config::ProxyConfig;
use crate::health::HealthChecker;
use crate::load_balancer::backend::{Backend, BackendIdGenerator};
use crate::load_balancer::balancer::LoadBalancer;
use crate::load_balancer::round_robin::RoundRobin;
use crate::load_balancer::upstream::UpstreamClient;
use crate::registry::{BackendRegistry, RegistryError, RoutingTable, TableError};
use crate::resilience::RetryPolicy;
use crate::routing::RouteManager;

/// Error type for topology construction.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid backend URL `{url}`: {source}")]
    BackendUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Everything the server needs, fully wired.
#[derive(Debug)]
pub struct Topology {
    pub registry: Arc<BackendRegistry>,
    pub routing_table: Arc<RoutingTable>,
    pub routes: Arc<RouteManager>,
    pub health_checker: HealthChecker,
}

/// Build the topology. Must be called inside a Tokio runtime.
///
/// The health checker is returned with every backend enqueued but not started.
pub fn build_topology(config: &ProxyConfig) -> Result<Topology, StartupError> {
    let ids = BackendIdGenerator::new();
    let registry = Arc::new(BackendRegistry::new());
    let routing_table = Arc::new(RoutingTable::new());
    let client = UpstreamClient::new(&config.upstream);
    let health_checker = HealthChecker::new(&config.health_check, client.clone(), registry.clone());
    let retry = RetryPolicy::from_config(&config.retries);

    for group in &config.backend_groups {
        let mut backends = Vec::with_capacity(group.backends.len());
        for backend in &group.backends {
            let url = Url::parse(&backend.url).map_err(|source| StartupError::BackendUrl {
                url: backend.url.clone(),
                source,
            })?;
            let backend = Arc::new(Backend::new(ids.next_id(), url, backend.health_path.clone()));
            registry.add_backend(backend.clone());
            backends.push(backend);
        }

        let backend_ids: Vec<_> = backends.iter().map(|b| b.id()).collect();
        let mut balancers = Vec::with_capacity(group.load_balancers);
        for _ in 0..group.load_balancers {
            let lb = LoadBalancer::builder(group.id.as_str(), registry.clone(), client.clone())
                .strategy(Box::new(RoundRobin::new()))
                .retry_policy(retry.clone())
                .max_body_size(config.security.max_body_size)
                .subscribe_to(&backend_ids)
                .build()?;
            balancers.push(Arc::new(lb));
        }

        routing_table.add_backend_group(&group.id, backends.clone(), balancers)?;
        for backend in backends {
            health_checker.add_backend(backend);
        }

        tracing::info!(
            group = %group.id,
            backends = group.backends.len(),
            load_balancers = group.load_balancers,
            "Backend group ready"
        );
    }

    let routes = Arc::new(RouteManager::new(&config.routes, routing_table.clone()));

    Ok(Topology {
        registry,
        routing_table,
        routes,
        health_checker,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, BackendGroupConfig, MatchKind, RouteConfig};

    fn config() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        for (id, ports, instances) in [("api", [8081, 8082], 2), ("web", [8091, 8092], 1)] {
            config.backend_groups.push(BackendGroupConfig {
                id: id.into(),
                load_balancers: instances,
                backends: ports
                    .iter()
                    .map(|port| BackendConfig {
                        url: format!("http://127.0.0.1:{}", port),
                        health_path: "/health".into(),
                    })
                    .collect(),
            });
        }
        config.routes.push(RouteConfig {
            path: "/api".into(),
            match_kind: MatchKind::Prefix,
            group: "api".into(),
        });
        config
    }

    #[tokio::test]
    async fn wires_every_group() {
        let topology = build_topology(&config()).unwrap();

        assert_eq!(topology.registry.len(), 4);
        assert_eq!(topology.routing_table.load_balancers_for_group("api").unwrap().len(), 2);
        assert_eq!(topology.routing_table.backends_for_group("web").unwrap().len(), 2);

        let web = topology.routing_table.backends_for_group("web").unwrap();
        for backend in web.iter() {
            assert_eq!(topology.registry.subscriber_count(backend.id()), 1);
            assert_eq!(topology.routing_table.group_of_backend(backend.id()).as_deref(), Some("web"));
        }

        let (group, lb) = topology.routes.resolve("/api/users").unwrap();
        assert_eq!(group, "api");
        assert!(lb.healthy_backends().is_empty());
    }

    #[tokio::test]
    async fn rejects_bad_backend_url() {
        let mut config = config();
        config.backend_groups[0].backends[0].url = "::not a url::".into();
        let err = build_topology(&config).unwrap_err();
        assert!(matches!(err, StartupError::BackendUrl { .. }));
    }
}
