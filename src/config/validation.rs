//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing groups)
//! - Validate value ranges (frequencies > 0, addresses parse)
//! - Detect duplicate groups, routes and backends
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::SocketAddr;
use url::Url;

use crate::config::schema::{ProxyConfig, RateLimiterKind};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("`{}` is not a socket address", config.listener.bind_address),
        ));
    }

    validate_groups(config, &mut errors);
    validate_routes(config, &mut errors);
    validate_tunables(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_groups(config: &ProxyConfig, errors: &mut Vec<ValidationError>) {
    if config.backend_groups.is_empty() {
        errors.push(ValidationError::new("backend_groups", "at least one backend group is required"));
    }

    let mut group_ids = HashSet::new();
    let mut backend_owner: HashMap<String, &str> = HashMap::new();

    for (i, group) in config.backend_groups.iter().enumerate() {
        let field = format!("backend_groups[{}]", i);

        if group.id.trim().is_empty() {
            errors.push(ValidationError::new(format!("{}.id", field), "must not be empty"));
        } else if !group_ids.insert(group.id.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.id", field),
                format!("duplicate group `{}`", group.id),
            ));
        }

        if group.load_balancers == 0 {
            errors.push(ValidationError::new(
                format!("{}.load_balancers", field),
                "must be at least 1",
            ));
        }

        if group.backends.is_empty() {
            errors.push(ValidationError::new(
                format!("{}.backends", field),
                "a group needs at least one backend",
            ));
        }

        for (j, backend) in group.backends.iter().enumerate() {
            let field = format!("{}.backends[{}]", field, j);

            match Url::parse(&backend.url) {
                Ok(url) if url.scheme() == "http" && url.host().is_some() => {
                    let key = url.as_str().trim_end_matches('/').to_string();
                    if let Some(owner) = backend_owner.insert(key, group.id.as_str()) {
                        errors.push(ValidationError::new(
                            format!("{}.url", field),
                            format!("`{}` is already listed in group `{}`", backend.url, owner),
                        ));
                    }
                }
                Ok(_) => errors.push(ValidationError::new(
                    format!("{}.url", field),
                    format!("`{}` must be an http:// URL with a host", backend.url),
                )),
                Err(e) => errors.push(ValidationError::new(
                    format!("{}.url", field),
                    format!("`{}` is not a valid URL: {}", backend.url, e),
                )),
            }

            if !backend.health_path.starts_with('/') {
                errors.push(ValidationError::new(
                    format!("{}.health_path", field),
                    "must start with `/`",
                ));
            }
        }
    }
}

fn validate_routes(config: &ProxyConfig, errors: &mut Vec<ValidationError>) {
    let group_ids: HashSet<&str> = config.backend_groups.iter().map(|g| g.id.as_str()).collect();
    let mut paths = HashSet::new();

    for (i, route) in config.routes.iter().enumerate() {
        let field = format!("routes[{}]", i);

        if !route.path.starts_with('/') {
            errors.push(ValidationError::new(format!("{}.path", field), "must start with `/`"));
        } else if !paths.insert((route.path.trim_end_matches('/'), route.match_kind)) {
            errors.push(ValidationError::new(
                format!("{}.path", field),
                format!("duplicate route `{}`", route.path),
            ));
        }

        if !group_ids.contains(route.group.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.group", field),
                format!("unknown backend group `{}`", route.group),
            ));
        }
    }
}

fn validate_tunables(config: &ProxyConfig, errors: &mut Vec<ValidationError>) {
    let hc = &config.health_check;
    for (field, value) in [
        ("health_check.healthy_frequency_ms", hc.healthy_frequency_ms),
        ("health_check.unhealthy_frequency_ms", hc.unhealthy_frequency_ms),
        ("health_check.timeout_ms", hc.timeout_ms),
        ("upstream.timeout_ms", config.upstream.timeout_ms),
        ("timeouts.request_secs", config.timeouts.request_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    if hc.workers == 0 {
        errors.push(ValidationError::new("health_check.workers", "must be greater than 0"));
    }

    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
    }

    if config.rate_limit.kind == RateLimiterKind::FixedWindow {
        if config.rate_limit.limit == 0 {
            errors.push(ValidationError::new("rate_limit.limit", "must be greater than 0"));
        }
        if config.rate_limit.window_ms == 0 {
            errors.push(ValidationError::new("rate_limit.window_ms", "must be greater than 0"));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("`{}` is not a socket address", config.observability.metrics_address),
        ));
    }
}
