//! Round-robin load balancing strategy.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use crate::load_balancer::{
    backend::Backend,
    strategy::{LoadBalancingStrategy, StrategyError},
};

/// Round-robin selector.
///
/// The counter advances once per call no matter which candidate slice is
/// passed in, so a change in the healthy set can skip or repeat a backend
/// once before the rotation settles again.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancingStrategy for RoundRobin {
    fn next_backend(&self, candidates: &[Arc<Backend>]) -> Result<Arc<Backend>, StrategyError> {
        if candidates.is_empty() {
            return Err(StrategyError::NoCandidates);
        }

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Ok(candidates[index].clone())
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}
