//! Routing table.
//!
//! # Responsibilities
//! - Map backend groups to their backends and load balancers
//! - Map backends back to their group and load balancers
//!
//! # Design Decisions
//! - Populated once at startup, read concurrently afterwards
//! - Reads are lock-free lookups; writers are serialized so a group's
//!   indices are checked and filled as one step
//! - A backend belongs to exactly one group

use std::sync::{Arc, Mutex, PoisonError};
use dashmap::DashMap;

use crate::load_balancer::backend::{Backend, BackendId};
use crate::load_balancer::balancer::LoadBalancer;

/// Error type for routing table population.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    #[error("backend group `{0}` is already registered")]
    DuplicateGroup(String),
    #[error("backend group `{0}` has no backends")]
    EmptyGroup(String),
    #[error("backend group `{0}` has no load balancers")]
    NoLoadBalancers(String),
    #[error("{backend} already belongs to backend group `{group}`")]
    BackendAlreadyGrouped { backend: BackendId, group: String },
}

/// Group and backend indices built from configuration.
#[derive(Debug, Default)]
pub struct RoutingTable {
    group_backends: DashMap<String, Arc<[Arc<Backend>]>>,
    group_balancers: DashMap<String, Arc<[Arc<LoadBalancer>]>>,
    backend_balancers: DashMap<BackendId, Arc<[Arc<LoadBalancer>]>>,
    backend_group: DashMap<BackendId, String>,
    writer: Mutex<()>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend group with its backends and the load balancers serving it.
    pub fn add_backend_group(
        &self,
        group: &str,
        backends: Vec<Arc<Backend>>,
        load_balancers: Vec<Arc<LoadBalancer>>,
    ) -> Result<(), TableError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        if self.group_backends.contains_key(group) {
            return Err(TableError::DuplicateGroup(group.to_string()));
        }
        if backends.is_empty() {
            return Err(TableError::EmptyGroup(group.to_string()));
        }
        if load_balancers.is_empty() {
            return Err(TableError::NoLoadBalancers(group.to_string()));
        }
        for backend in &backends {
            if let Some(existing) = self.backend_group.get(&backend.id()) {
                return Err(TableError::BackendAlreadyGrouped {
                    backend: backend.id(),
                    group: existing.value().clone(),
                });
            }
        }

        let load_balancers: Arc<[Arc<LoadBalancer>]> = load_balancers.into();
        for backend in &backends {
            self.backend_group.insert(backend.id(), group.to_string());
            self.backend_balancers.insert(backend.id(), load_balancers.clone());
        }
        self.group_balancers.insert(group.to_string(), load_balancers);
        self.group_backends.insert(group.to_string(), backends.into());

        tracing::debug!(group = %group, "Backend group registered");
        Ok(())
    }

    pub fn backends_for_group(&self, group: &str) -> Option<Arc<[Arc<Backend>]>> {
        self.group_backends.get(group).map(|entry| entry.value().clone())
    }

    pub fn load_balancers_for_group(&self, group: &str) -> Option<Arc<[Arc<LoadBalancer>]>> {
        self.group_balancers.get(group).map(|entry| entry.value().clone())
    }

    pub fn load_balancers_for_backend(&self, backend: BackendId) -> Option<Arc<[Arc<LoadBalancer>]>> {
        self.backend_balancers.get(&backend).map(|entry| entry.value().clone())
    }

    pub fn group_of_backend(&self, backend: BackendId) -> Option<String> {
        self.backend_group.get(&backend).map(|entry| entry.value().clone())
    }

    /// Names of all registered groups.
    pub fn groups(&self) -> Vec<String> {
        self.group_backends.iter().map(|entry| entry.key().clone()).collect()
    }
}
