//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (cap ≥ 1, timeouts > 0)
//! - Check that addresses and URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SamplerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{SamplerConfig, StorageBackend};

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("upstream.url: {0}")]
    InvalidUpstream(String),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("storage.path must not be empty for the sqlite backend")]
    EmptyStoragePath,

    #[error("admin.api_key must be set when the admin API is enabled")]
    MissingAdminKey,

    #[error("proxy.health_path must start with '/'")]
    InvalidHealthPath,
}

/// Check every rule and collect all failures.
pub fn validate_config(config: &SamplerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);

    match Url::parse(&config.upstream.url) {
        Ok(url) if url.scheme() != "http" => errors.push(ValidationError::InvalidUpstream(format!(
            "unsupported scheme '{}', only http is forwarded",
            url.scheme()
        ))),
        Ok(url) if url.host_str().is_none() => {
            errors.push(ValidationError::InvalidUpstream("missing host".to_string()))
        }
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::InvalidUpstream(e.to_string())),
    }

    let zero_checks: [(&'static str, bool); 7] = [
        ("listener.max_connections", config.listener.max_connections == 0),
        ("timeouts.connect_secs", config.timeouts.connect_secs == 0),
        ("timeouts.request_secs", config.timeouts.request_secs == 0),
        (
            "collector.max_samples_per_fingerprint",
            config.collector.max_samples_per_fingerprint == 0,
        ),
        ("collector.queue_capacity", config.collector.queue_capacity == 0),
        ("collector.process_timeout_ms", config.collector.process_timeout_ms == 0),
        ("security.max_body_size", config.security.max_body_size == 0),
    ];
    for (field, is_zero) in zero_checks {
        if is_zero {
            errors.push(ValidationError::Zero { field });
        }
    }

    if config.storage.backend == StorageBackend::Sqlite && config.storage.path.trim().is_empty() {
        errors.push(ValidationError::EmptyStoragePath);
    }

    if let Some(path) = config.proxy.health_path.as_deref() {
        if !path.is_empty() && !path.starts_with('/') {
            errors.push(ValidationError::InvalidHealthPath);
        }
    }

    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::MissingAdminKey);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
