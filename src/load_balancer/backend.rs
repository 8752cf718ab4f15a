//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream server (identity, base URL, health endpoint)
//! - Carry health transitions from the checker to registry subscribers
//!
//! # Design Decisions
//! - A `Backend` is immutable once built; health is tracked out-of-band
//! - Ids are non-zero, so a status event can never be "empty"

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

/// Opaque, process-unique handle for a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendId(NonZeroU64);

impl BackendId {
    /// Build an id from a raw value. Zero is not a valid id.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Get the raw id value.
    pub fn as_u64(&self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "backend-{}", self.0)
    }
}

/// Hands out sequential backend ids.
///
/// Owned by whoever assembles the topology, so separate topologies
/// (and tests) never share a counter.
#[derive(Debug, Default)]
pub struct BackendIdGenerator {
    issued: AtomicU64,
}

impl BackendIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id. The first id is 1.
    pub fn next_id(&self) -> BackendId {
        let issued = self.issued.fetch_add(1, Ordering::Relaxed);
        BackendId(NonZeroU64::MIN.saturating_add(issued))
    }
}

/// A single upstream server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    id: BackendId,
    url: Url,
    health_path: String,
}

impl Backend {
    /// Create a new backend.
    pub fn new(id: BackendId, url: Url, health_path: impl Into<String>) -> Self {
        Self {
            id,
            url,
            health_path: health_path.into(),
        }
    }

    pub fn id(&self) -> BackendId {
        self.id
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn health_path(&self) -> &str {
        &self.health_path
    }

    /// Base URL without the trailing slash `Url` normalizes in.
    pub fn base(&self) -> &str {
        self.url.as_str().trim_end_matches('/')
    }

    /// Full URL probed by the health checker.
    pub fn health_url(&self) -> String {
        format!("{}{}", self.base(), self.health_path)
    }

    /// Target URL for a proxied request, keeping the inbound path and query verbatim.
    pub fn target_url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base(), path_and_query)
    }
}

/// A health transition for one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendStatus {
    pub backend: BackendId,
    pub is_healthy: bool,
}

impl BackendStatus {
    pub fn new(backend: BackendId, is_healthy: bool) -> Self {
        Self { backend, is_healthy }
    }

    pub fn healthy(backend: BackendId) -> Self {
        Self::new(backend, true)
    }

    pub fn unhealthy(backend: BackendId) -> Self {
        Self::new(backend, false)
    }
}
