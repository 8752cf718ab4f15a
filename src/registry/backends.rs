//! Backend registry.
//!
//! # Responsibilities
//! - Authoritative store of backend identity
//! - Remember the last published health of every backend
//! - Fan out health transitions to every subscriber of a backend
//!
//! # Design Decisions
//! - One reader/writer lock over all registry state
//! - The lock is never held across a send; publishers may wait on a full
//!   subscriber queue, but lookups never do
//! - Subscribers whose receiver is gone are pruned on the next publish

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;

use crate::load_balancer::backend::{Backend, BackendId, BackendStatus};

/// Capacity of a dedicated subscription channel.
pub const SUBSCRIPTION_BUFFER: usize = 10;

/// Error type for registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("{0} is not registered")]
    UnknownBackend(BackendId),
}

#[derive(Debug, Default)]
struct RegistryState {
    backends: HashMap<BackendId, Arc<Backend>>,
    statuses: HashMap<BackendId, bool>,
    subscribers: HashMap<BackendId, Vec<mpsc::Sender<BackendStatus>>>,
}

/// Identity store and pub/sub hub for backend health.
#[derive(Debug, Default)]
pub struct BackendRegistry {
    state: RwLock<RegistryState>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend. Registering the same id twice keeps the first entry.
    pub fn add_backend(&self, backend: Arc<Backend>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.backends.entry(backend.id()).or_insert(backend);
    }

    /// Look up a backend by id.
    pub fn backend(&self, id: BackendId) -> Option<Arc<Backend>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.backends.get(&id).cloned()
    }

    /// Last health published for a backend, `None` until its first transition.
    pub fn last_status(&self, id: BackendId) -> Option<bool> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.statuses.get(&id).copied()
    }

    /// Number of registered backends.
    pub fn len(&self) -> usize {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live subscriptions for a backend.
    pub fn subscriber_count(&self, id: BackendId) -> usize {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.subscribers.get(&id).map_or(0, Vec::len)
    }

    /// Subscribe to a backend through a dedicated bounded channel.
    pub fn subscribe(&self, id: BackendId) -> Result<mpsc::Receiver<BackendStatus>, RegistryError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.subscribe_with(id, tx)?;
        Ok(rx)
    }

    /// Subscribe to a backend through an existing sender.
    ///
    /// A load balancer passes the same sender for every backend of its group
    /// so all transitions land in one queue.
    pub fn subscribe_with(
        &self,
        id: BackendId,
        sender: mpsc::Sender<BackendStatus>,
    ) -> Result<(), RegistryError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !state.backends.contains_key(&id) {
            return Err(RegistryError::UnknownBackend(id));
        }
        state.subscribers.entry(id).or_default().push(sender);
        Ok(())
    }

    /// Record a health transition and deliver it to every subscriber.
    ///
    /// Returns how many subscribers received it.
    pub async fn update_health(&self, status: BackendStatus) -> Result<usize, RegistryError> {
        let subscribers = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if !state.backends.contains_key(&status.backend) {
                return Err(RegistryError::UnknownBackend(status.backend));
            }
            state.statuses.insert(status.backend, status.is_healthy);
            state.subscribers.get(&status.backend).cloned().unwrap_or_default()
        };

        let mut delivered = 0;
        let mut closed = 0;
        for subscriber in &subscribers {
            if subscriber.send(status).await.is_ok() {
                delivered += 1;
            } else {
                closed += 1;
            }
        }

        if closed > 0 {
            tracing::warn!(
                backend = %status.backend,
                closed,
                "Dropping closed health subscriptions"
            );
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(subs) = state.subscribers.get_mut(&status.backend) {
                subs.retain(|tx| !tx.is_closed());
            }
        }

        Ok(delivered)
    }
}
