//! Route matching logic.
//!
//! # Responsibilities
//! - Match a request path exactly (trailing slash ignored)
//! - Match a request path by prefix on segment boundaries
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - No regex to guarantee O(n) matching
//! - `/api` matches `/api` and `/api/users` but not `/apiary`

use crate::config::{MatchKind, RouteConfig};

/// Trait for matching request paths against a route.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the path matches this condition.
    fn matches(&self, path: &str) -> bool;

    /// Number of significant path bytes; longer wins among prefixes.
    fn specificity(&self) -> usize;
}

/// Strip trailing slashes, keeping the root as `/`.
pub fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

/// Matches one path exactly.
#[derive(Debug, Clone)]
pub struct ExactPathMatcher {
    path: String,
}

impl ExactPathMatcher {
    pub fn new(path: &str) -> Self {
        Self {
            path: normalize(path).to_string(),
        }
    }
}

impl Matcher for ExactPathMatcher {
    fn matches(&self, path: &str) -> bool {
        normalize(path) == self.path
    }

    fn specificity(&self) -> usize {
        self.path.len()
    }
}

/// Matches the request path prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a new path prefix matcher.
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: normalize(prefix).to_string(),
        }
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, path: &str) -> bool {
        if self.prefix == "/" {
            return true;
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    fn specificity(&self) -> usize {
        self.prefix.len()
    }
}

/// Build the matcher a route asks for.
pub fn for_route(route: &RouteConfig) -> Box<dyn Matcher> {
    match route.match_kind {
        MatchKind::Exact => Box::new(ExactPathMatcher::new(&route.path)),
        MatchKind::Prefix => Box::new(PathPrefixMatcher::new(&route.path)),
    }
}
