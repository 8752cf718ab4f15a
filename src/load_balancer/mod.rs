//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Route matched → backend group identified
//!     → balancer.rs (snapshot of the group's healthy set)
//!     → strategy.rs / round_robin.rs (pick one backend)
//!     → upstream.rs (pooled client, per-attempt timeout)
//!     → retry/backoff loop (resilience)
//!     → stream response back
//!
//! Health transitions (registry) → balancer listener → healthy set
//! ```
//!
//! # Design Decisions
//! - One load balancer per group instance; several may serve one group
//! - Unhealthy backends are never selected
//! - Algorithm is pluggable behind a trait

pub mod backend;
pub mod balancer;
pub mod round_robin;
pub mod strategy;
pub mod upstream;

pub use backend::{Backend, BackendId, BackendIdGenerator, BackendStatus};
pub use balancer::{LoadBalancer, LoadBalancerBuilder};
pub use round_robin::RoundRobin;
pub use strategy::{LoadBalancingStrategy, StrategyError};
pub use upstream::{ForwardError, UpstreamClient};
