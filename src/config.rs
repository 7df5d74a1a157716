//! Configuration management for Tollgate.
//!
//! Configuration is static for the life of the process. It is read from an
//! optional YAML file, then overridden by `TOLLGATE__<SECTION>__<FIELD>`
//! environment variables.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TollgateError};
use crate::ratelimit::{
    EnforcementMode, FailurePolicy, RateLimitPolicy, DEFAULT_KEY_PREFIX, DEFAULT_LIMIT,
    DEFAULT_WINDOW_SECS,
};
use crate::store::RedisStoreConfig;

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "TOLLGATE";

/// Main configuration for the Tollgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Window store configuration
    #[serde(default)]
    pub store: StoreConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Requests admitted per window
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Namespace for counter keys in the store
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Best-effort two-call sequence or strict atomic increment
    #[serde(default)]
    pub enforcement: EnforcementMode,

    /// Behaviour when the store is unreachable
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_secs: default_window_secs(),
            key_prefix: default_key_prefix(),
            enforcement: EnforcementMode::default(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

fn default_limit() -> u64 {
    DEFAULT_LIMIT
}

fn default_window_secs() -> u64 {
    DEFAULT_WINDOW_SECS
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

/// Which window store implementation to run against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Shared Redis instance
    #[default]
    Redis,
    /// Process-local map; quotas are not shared between processes
    Memory,
}

/// Window store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Store host
    #[serde(default = "default_store_host")]
    pub host: String,

    /// Store port
    #[serde(default = "default_store_port")]
    pub port: u16,

    /// Initial connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_ms: u64,

    /// How often the memory backend purges expired counters
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            host: default_store_host(),
            port: default_store_port(),
            connect_timeout_ms: default_connect_timeout(),
            operation_timeout_ms: default_operation_timeout(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_store_host() -> String {
    "localhost".to_string()
}

fn default_store_port() -> u16 {
    6379
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_operation_timeout() -> u64 {
    500
}

fn default_sweep_interval() -> u64 {
    30
}

impl StoreConfig {
    /// Connection settings for the Redis backend.
    pub fn redis(&self) -> RedisStoreConfig {
        RedisStoreConfig {
            host: self.host.clone(),
            port: self.port,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }
}

impl TollgateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TollgateError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Load layered configuration: defaults, then the optional file, then
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Build the validated limiter policy described by this configuration.
    pub fn policy(&self) -> Result<RateLimitPolicy> {
        let policy = RateLimitPolicy::new(self.rate_limiting.limit, self.rate_limiting.window_secs)?
            .with_key_prefix(self.rate_limiting.key_prefix.clone())
            .with_enforcement(self.rate_limiting.enforcement)
            .with_store_timeout(Duration::from_millis(self.store.operation_timeout_ms));
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TollgateConfig::default();

        assert_eq!(config.server.http_addr, "127.0.0.1:8000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.rate_limiting.limit, 10);
        assert_eq!(config.rate_limiting.window_secs, 60);
        assert_eq!(config.rate_limiting.key_prefix, "rate_limit");
        assert_eq!(config.rate_limiting.failure_policy, FailurePolicy::FailOpen);
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.host, "localhost");
        assert_eq!(config.store.port, 6379);
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
rate_limiting:
  limit: 100
  enforcement: strict
store:
  backend: memory
  port: 6380
"#;
        let config = TollgateConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.rate_limiting.limit, 100);
        assert_eq!(config.rate_limiting.window_secs, 60);
        assert_eq!(config.rate_limiting.enforcement, EnforcementMode::Strict);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.port, 6380);
        assert_eq!(config.store.host, "localhost");
    }

    #[test]
    fn test_parse_failure_is_config_error() {
        let result = TollgateConfig::from_yaml("rate_limiting:\n  limit: -3\n");
        assert!(matches!(result, Err(TollgateError::Config(_))));
    }

    #[test]
    fn test_policy_from_config() {
        let mut config = TollgateConfig::default();
        config.rate_limiting.limit = 25;
        config.rate_limiting.window_secs = 10;
        config.store.operation_timeout_ms = 250;

        let policy = config.policy().unwrap();
        assert_eq!(policy.limit(), 25);
        assert_eq!(policy.window_secs(), 10);
        assert_eq!(policy.store_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_zero_window_is_invalid() {
        let mut config = TollgateConfig::default();
        config.rate_limiting.window_secs = 0;

        assert!(matches!(
            config.policy(),
            Err(TollgateError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_unbounded_window_is_invalid() {
        let config = TollgateConfig::from_yaml("rate_limiting:\n  window_secs: 18446744073709551615\n")
            .unwrap();

        assert!(matches!(
            config.policy(),
            Err(TollgateError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_redis_settings() {
        let mut config = TollgateConfig::default();
        config.store.host = "redis.internal".to_string();
        config.store.connect_timeout_ms = 1500;

        let redis = config.store.redis();
        assert_eq!(redis.url(), "redis://redis.internal:6379/");
        assert_eq!(redis.connect_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_load_layers_file_over_defaults() {
        let path = std::env::temp_dir().join(format!("tollgate-config-{}.yaml", std::process::id()));
        std::fs::write(
            &path,
            "rate_limiting:\n  window_secs: 15\nstore:\n  host: redis.internal\n",
        )
        .unwrap();

        let loaded = TollgateConfig::load(Some(path.as_path())).unwrap();
        let parsed = TollgateConfig::from_file(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).unwrap();

        for config in [loaded, parsed] {
            assert_eq!(config.rate_limiting.window_secs, 15);
            assert_eq!(config.rate_limiting.limit, 10);
            assert_eq!(config.store.host, "redis.internal");
        }
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let result = TollgateConfig::load(Some(Path::new("/nonexistent/tollgate.yaml")));
        assert!(matches!(result, Err(TollgateError::Config(_))));
    }

    #[test]
    fn test_env_overrides_file() {
        const VAR: &str = "TOLLGATE__RATE_LIMITING__KEY_PREFIX";
        let path = std::env::temp_dir().join(format!("tollgate-env-{}.yaml", std::process::id()));
        std::fs::write(&path, "rate_limiting:\n  key_prefix: from_file\n").unwrap();

        std::env::set_var(VAR, "from_env");
        let overridden = TollgateConfig::load(Some(path.as_path()));
        std::env::remove_var(VAR);
        let file_only = TollgateConfig::load(Some(path.as_path()));
        std::fs::remove_file(&path).unwrap();

        assert_eq!(overridden.unwrap().rate_limiting.key_prefix, "from_env");
        assert_eq!(file_only.unwrap().rate_limiting.key_prefix, "from_file");
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = TollgateConfig::load(None).unwrap();
        assert_eq!(config.rate_limiting.limit, 10);
    }
}
