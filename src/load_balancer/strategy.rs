//! Backend selection policy.

use std::sync::Arc;
use crate::load_balancer::backend::Backend;

/// Error returned when a strategy cannot pick a backend.
///
/// Callers treat this as "no backend available" and do not retry the call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StrategyError {
    #[error("no candidate backends to choose from")]
    NoCandidates,
}

/// Pluggable policy choosing one backend out of the current healthy set.
pub trait LoadBalancingStrategy: Send + Sync + std::fmt::Debug {
    /// Pick the backend for the next request.
    fn next_backend(&self, candidates: &[Arc<Backend>]) -> Result<Arc<Backend>, StrategyError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}
