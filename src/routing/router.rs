//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Resolve a request path to a backend group and one of its load balancers
//! - Return an explicit no-match rather than a silent default
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Exact routes win over prefix routes; the longest prefix wins among prefixes
//! - Several load balancers of one group take turns

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::{MatchKind, RouteConfig};
use crate::load_balancer::balancer::LoadBalancer;
use crate::registry::RoutingTable;
use crate::routing::matcher::{self, Matcher};

#[derive(Debug)]
struct Route {
    matcher: Box<dyn Matcher>,
    group: String,
}

/// Path router in front of the load balancers.
#[derive(Debug)]
pub struct RouteManager {
    exact: Vec<Route>,
    prefix: Vec<Route>,
    table: Arc<RoutingTable>,
    rotation: AtomicUsize,
}

impl RouteManager {
    /// Compile routes. Prefix routes are ordered longest first.
    pub fn new(routes: &[RouteConfig], table: Arc<RoutingTable>) -> Self {
        let mut exact = Vec::new();
        let mut prefix = Vec::new();

        for config in routes {
            let route = Route {
                matcher: matcher::for_route(config),
                group: config.group.clone(),
            };
            match config.match_kind {
                MatchKind::Exact => exact.push(route),
                MatchKind::Prefix => prefix.push(route),
            }
        }
        prefix.sort_by(|a, b| b.matcher.specificity().cmp(&a.matcher.specificity()));

        tracing::debug!(exact = exact.len(), prefix = prefix.len(), "Routes compiled");

        Self {
            exact,
            prefix,
            table,
            rotation: AtomicUsize::new(0),
        }
    }

    /// Group serving `path`, if any route matches.
    pub fn resolve_group(&self, path: &str) -> Option<&str> {
        self.exact
            .iter()
            .chain(self.prefix.iter())
            .find(|route| route.matcher.matches(path))
            .map(|route| route.group.as_str())
    }

    /// Group and load balancer for `path`.
    pub fn resolve(&self, path: &str) -> Option<(String, Arc<LoadBalancer>)> {
        let group = self.resolve_group(path)?;
        let balancers = self.table.load_balancers_for_group(group)?;
        if balancers.is_empty() {
            return None;
        }

        let index = self.rotation.fetch_add(1, Ordering::Relaxed) % balancers.len();
        Some((group.to_string(), balancers[index].clone()))
    }
}
