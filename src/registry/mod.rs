//! Backend registry and routing table.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     config backend groups
//!     → backends.rs (register identities)
//!     → table.rs (group ⇄ backends ⇄ load balancers)
//!
//! Runtime:
//!     health checker transition
//!     → backends.rs update_health
//!     → every subscribed load balancer queue
//! ```
//!
//! # Design Decisions
//! - Topology is static after startup; only health moves
//! - The registry owns identity, load balancers only hold shared references

pub mod backends;
pub mod table;

pub use backends::{BackendRegistry, RegistryError, SUBSCRIPTION_BUFFER};
pub use table::{RoutingTable, TableError};
