//! Health-aware Layer-7 HTTP(S) load balancer library.

pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;
pub mod registry;
pub mod resilience;
pub mod routing;
pub mod security;

#[cfg(test)]
mod test_support;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
