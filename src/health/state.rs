//! Backend health state machine.
//!
//! # States
//! - Healthy: backend receives traffic
//! - Unhealthy: backend excluded from load balancing (initial state)
//!
//! # State Transitions
//! ```text
//! Unhealthy → Healthy: probe returns 200
//! Healthy → Unhealthy: probe fails (error, timeout or non-200)
//! ```
//!
//! # Design Decisions
//! - Edge-triggered: only a disagreement with the current state is a transition
//! - Membership check, update and publish happen under one lock, so two
//!   workers can never report the same transition twice

use std::collections::HashSet;
use tokio::sync::{Mutex, MutexGuard};

/// Health state of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

impl HealthState {
    pub fn from_probe(ok: bool) -> Self {
        if ok {
            HealthState::Healthy
        } else {
            HealthState::Unhealthy
        }
    }

    pub fn is_healthy(self) -> bool {
        self == HealthState::Healthy
    }
}

/// Set of backends currently believed healthy, keyed by backend URL.
#[derive(Debug, Default)]
pub struct HealthySet {
    members: Mutex<HashSet<String>>,
}

impl HealthySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the transition lock. Hold the guard until the transition is published.
    pub async fn lock(&self) -> HealthyMembers<'_> {
        HealthyMembers {
            members: self.members.lock().await,
        }
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.members.lock().await.contains(key)
    }

    pub async fn len(&self) -> usize {
        self.members.lock().await.len()
    }
}

/// Locked view of the healthy set.
#[derive(Debug)]
pub struct HealthyMembers<'a> {
    members: MutexGuard<'a, HashSet<String>>,
}

impl HealthyMembers<'_> {
    pub fn state_of(&self, key: &str) -> HealthState {
        HealthState::from_probe(self.members.contains(key))
    }

    /// Apply an observation. Returns the new state only if it changed.
    pub fn apply(&mut self, key: &str, observed: HealthState) -> Option<HealthState> {
        if self.state_of(key) == observed {
            return None;
        }
        match observed {
            HealthState::Healthy => self.members.insert(key.to_string()),
            HealthState::Unhealthy => self.members.remove(key),
        };
        Some(observed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "http://127.0.0.1:8081/";

    #[tokio::test]
    async fn unknown_backend_starts_unhealthy() {
        let set = HealthySet::new();
        let mut members = set.lock().await;
        assert_eq!(members.state_of(KEY), HealthState::Unhealthy);
        assert_eq!(members.apply(KEY, HealthState::Unhealthy), None);
    }

    #[tokio::test]
    async fn only_flips_are_transitions() {
        let set = HealthySet::new();
        {
            let mut members = set.lock().await;
            assert_eq!(members.apply(KEY, HealthState::Healthy), Some(HealthState::Healthy));
            assert_eq!(members.apply(KEY, HealthState::Healthy), None);
        }
        assert!(set.contains(KEY).await);

        {
            let mut members = set.lock().await;
            assert_eq!(members.apply(KEY, HealthState::Unhealthy), Some(HealthState::Unhealthy));
            assert_eq!(members.apply(KEY, HealthState::Unhealthy), None);
        }
        assert!(!set.contains(KEY).await);
        assert_eq!(set.len().await, 0);
    }
}
