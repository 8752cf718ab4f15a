//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Work queue → worker pool
//!     → GET {backend}{health_path}
//!     → compare with state.rs under its lock
//!     → BackendRegistry::update_health on a transition
//!     → re-enqueue after the state's frequency
//!
//! State machine (state.rs):
//!     Unhealthy (initial) ←→ Healthy
//! ```
//!
//! # Design Decisions
//! - Edge-triggered: registry traffic is O(transitions), not O(probes)
//! - Network errors and non-200 responses are the same signal
//! - Health state is per-backend URL, not per-group

pub mod active;
pub mod state;

pub use active::HealthChecker;
pub use state::{HealthState, HealthySet};
