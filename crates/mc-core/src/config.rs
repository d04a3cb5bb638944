//! Configuration types and loading.
//!
//! Config is layered: built-in defaults, then an optional file, then
//! `METACAT_*` environment variables. All values are bound once at boot and
//! copied into the synthesized operation descriptors; nothing re-reads
//! configuration per request.

use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AppConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Graph store configuration
    #[serde(default)]
    pub graph: GraphConfig,

    /// Registry document location
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Per-request defaults
    #[serde(default)]
    pub request: RequestConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8090,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphConfig {
    /// Maximum number of concurrently open graph-store sessions
    pub max_sessions: usize,
    /// How long an operation may wait for a session before failing as
    /// transiently unavailable
    pub acquire_timeout_ms: u64,
    /// Retry policy for retryable store conflicts
    pub retry: RetryConfig,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_sessions: 16,
            acquire_timeout_ms: 5_000,
            retry: RetryConfig::default(),
        }
    }
}

/// Bounded exponential backoff with jitter, applied to versioned-aspect
/// constraint races and other retryable store conflicts.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 10,
            max_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    /// Path to the registry YAML document
    pub path: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: "registry.yaml".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct RequestConfig {
    /// Default deadline applied to requests that do not carry one
    pub deadline_ms: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self { deadline_ms: 30_000 }
    }
}

impl AppConfig {
    /// Load configuration from an optional file plus `METACAT_*` env vars.
    ///
    /// Env vars use `__` as the section separator, e.g.
    /// `METACAT_GRAPH__MAX_SESSIONS=32`.
    pub fn load(file: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("METACAT")
                .separator("__")
                .try_parsing(true),
        );
        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.graph.max_sessions, 16);
        assert_eq!(config.graph.retry.max_attempts, 5);
        assert_eq!(config.graph.retry.base_delay_ms, 10);
        assert_eq!(config.graph.retry.max_delay_ms, 200);
        assert_eq!(config.request.deadline_ms, 30_000);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.server.port, 8090);
        assert_eq!(config.registry.path, "registry.yaml");
    }
}
