use crate::error::{ConfigError, Result};
use audit_engine::AuditConfig;
use auth_identity::CacheConfig;
use config::{Config, Environment, File, FileFormat, Map};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use telemetry::LogConfig;
use tracing::debug;

/// Prefix of environment overrides, e.g. `REBAC__SPICEDB__HOST`.
pub const ENV_PREFIX: &str = "REBAC";
pub const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpiceDbConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub pre_shared_key: String,
    /// Per-call deadline; 0 disables it.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    50051
}

fn default_request_timeout_ms() -> u64 {
    5000
}

impl Default for SpiceDbConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            pre_shared_key: String::new(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl SpiceDbConfig {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub spicedb: SpiceDbConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl AppConfig {
    /// Load from an optional YAML file, then apply `REBAC__` environment
    /// overrides from the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`load`](Self::load), reading overrides from `env` when given.
    pub fn load_with_env(path: Option<&Path>, env: Option<Map<String, String>>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::SourceNotFound(path.display().to_string()));
            }
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }

        let config: AppConfig = builder
            .add_source(environment().source(env))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse YAML text without consulting the environment.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.spicedb.host.trim().is_empty() {
            return Err(ConfigError::ValidationError("spicedb.host is empty".to_string()));
        }
        if self.spicedb.port == 0 {
            return Err(ConfigError::ValidationError("spicedb.port must be non-zero".to_string()));
        }
        if self.cache.max_cost == 0 {
            return Err(ConfigError::ValidationError("cache.max_cost must be positive".to_string()));
        }
        if self.audit.workers == 0 || self.audit.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "audit.workers and audit.queue_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}
