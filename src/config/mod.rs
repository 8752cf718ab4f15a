//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → handed to the composition root at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; topology is fixed for the process lifetime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BackendConfig, BackendGroupConfig, HealthCheckConfig, ListenerConfig, LogFormat, MatchKind,
    ObservabilityConfig, ProxyConfig, RateLimitConfig, RateLimiterKind, RetryConfig, RouteConfig,
    SecurityConfig, TimeoutConfig, TlsConfig, UpstreamConfig,
};
