//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (route lookup)
//!     → matcher.rs (exact or prefix)
//!     → RoutingTable (group → load balancers)
//!     → Return: (group, LoadBalancer) or NoMatch
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Split exact / prefix, sort prefixes longest first
//!     → Freeze as immutable RouteManager
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path
//! - Deterministic: same path always resolves to the same group

pub mod matcher;
pub mod router;

pub use router::RouteManager;
