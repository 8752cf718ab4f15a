//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (check per-IP limits)
//!     → Pass to routing
//! ```
//!
//! # Design Decisions
//! - Fail closed: a request without a client address is rejected
//! - The limiter is pluggable; the no-op variant admits everything

pub mod rate_limit;

pub use rate_limit::{FixedWindowRateLimiter, NoOpRateLimiter, RateLimiter, rate_limit_middleware};
