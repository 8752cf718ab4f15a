//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Attempt to backend:
//!     → retries.rs (classify outcome: success / client error / transient)
//!     → On transient failure: backoff.rs (attempt * base + jitter)
//!     → Next attempt, until the attempt budget is spent
//! ```
//!
//! # Design Decisions
//! - Fixed attempt budget per request (default 3)
//! - Linear backoff with jitter avoids synchronized retry storms
//! - No sleep after the final attempt

pub mod backoff;
pub mod retries;

pub use retries::{classify, AttemptOutcome, RetryPolicy};
