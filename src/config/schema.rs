//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the sampler.
//! All types derive Serde traits for deserialization from TOML files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collector::{ReplacementStrategy, RetentionPolicy, DEFAULT_MAX_SAMPLES_PER_FINGERPRINT};

/// Root configuration for the shape sampler.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SamplerConfig {
    /// Proxy listener settings.
    pub listener: ListenerConfig,

    /// The API being observed.
    pub upstream: UpstreamConfig,

    pub timeouts: TimeoutConfig,

    /// Retention and pipeline settings.
    pub collector: CollectorConfig,

    pub storage: StorageConfig,

    /// Extra denylist entries on top of the built-in ones.
    pub redaction: RedactionConfig,

    pub proxy: ProxyConfig,

    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,

    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Maximum concurrent in-flight requests (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            max_connections: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL every request is forwarded to. A path component is kept as prefix.
    pub url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
        }
    }
}

/// Timeout configuration for upstream calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Total time for the upstream request and response body, in seconds.
    pub request_secs: u64,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Retained samples per fingerprint.
    pub max_samples_per_fingerprint: u32,

    /// What to do with a new sample once the cap is reached.
    pub replacement: ReplacementStrategy,

    /// Pending observations before new ones are dropped.
    pub queue_capacity: usize,

    /// Deadline for processing one observation, in milliseconds.
    pub process_timeout_ms: u64,

    /// Fingerprinting time above which a warning is logged, in milliseconds.
    pub fingerprint_budget_ms: u64,
}

impl CollectorConfig {
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_samples_per_fingerprint: self.max_samples_per_fingerprint,
            strategy: self.replacement,
        }
    }

    pub fn process_timeout(&self) -> Duration {
        Duration::from_millis(self.process_timeout_ms)
    }

    pub fn fingerprint_budget(&self) -> Duration {
        Duration::from_millis(self.fingerprint_budget_ms)
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_samples_per_fingerprint: DEFAULT_MAX_SAMPLES_PER_FINGERPRINT,
            replacement: ReplacementStrategy::DropNew,
            queue_capacity: 1024,
            process_timeout_ms: 5_000,
            fingerprint_budget_ms: 2,
        }
    }
}

/// Repository backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Database file, used by the sqlite backend only.
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: "shape-sampler.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RedactionConfig {
    pub extra_headers: Vec<String>,
    pub extra_fields: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Path answered locally instead of being forwarded. Empty disables it.
    pub health_path: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            health_path: Some("/__sampler/health".to_string()),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API listener.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:3002".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum buffered request or response body, in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 10 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SamplerConfig::default();
        assert_eq!(config.listener.bind_address, "0.0.0.0:3000");
        assert_eq!(config.collector.max_samples_per_fingerprint, 50);
        assert_eq!(config.collector.replacement, ReplacementStrategy::DropNew);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.proxy.health_path.as_deref(), Some("/__sampler/health"));
        assert!(!config.admin.enabled);
    }

    #[test]
    fn test_partial_toml() {
        let config: SamplerConfig = toml::from_str(
            r#"
            [upstream]
            url = "http://api.internal:9000"

            [collector]
            max_samples_per_fingerprint = 5
            replacement = "evict_oldest"

            [storage]
            backend = "sqlite"
            "#,
        )
        .unwrap();

        assert_eq!(config.upstream.url, "http://api.internal:9000");
        assert_eq!(config.collector.max_samples_per_fingerprint, 5);
        assert_eq!(config.collector.queue_capacity, 1024);
        assert_eq!(
            config.collector.retention_policy().strategy,
            ReplacementStrategy::EvictOldest
        );
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.storage.path, "shape-sampler.db");
    }
}
