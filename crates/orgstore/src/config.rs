//! Storage configuration

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Connection string for the relational backend.
pub const ENV_DATABASE_URL: &str = "ORGSTORE_DATABASE_URL";
/// Endpoint URL of the remote KV service.
pub const ENV_REST_URL: &str = "ORGSTORE_KV_REST_URL";
/// Bearer token for the remote KV service.
pub const ENV_REST_TOKEN: &str = "ORGSTORE_KV_REST_TOKEN";
/// Filesystem root for the file document.
pub const ENV_DATA_DIR: &str = "ORGSTORE_DATA_DIR";

/// Remote KV service configuration.
///
/// Both fields are required; if either is missing from the environment
/// the REST backend is skipped entirely rather than failing at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestConfig {
    /// Service endpoint URL (e.g., "https://kv.example.com")
    pub endpoint: String,
    /// Bearer token sent with every request
    pub token: String,
}

impl RestConfig {
    /// Create from endpoint and token.
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: token.into(),
        }
    }
}

/// HTTP client settings for the REST driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Connection establishment timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Whole-request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Connection pool settings for the relational backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum connections allowed
    pub max_connections: u32,
    /// Timeout for acquiring a connection from the pool
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Main storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Relational connection string (absence means that backend is
    /// never selected)
    pub database_url: Option<String>,
    /// Remote KV service (endpoint + token, both required)
    pub rest: Option<RestConfig>,
    /// Filesystem root for the file document (created if missing)
    pub data_dir: PathBuf,
    /// Connection pool settings
    pub pool: PoolConfig,
    /// HTTP client settings
    pub http: HttpConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            rest: None,
            data_dir: PathBuf::from("data"),
            pool: PoolConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl StorageConfig {
    /// Load configuration from `ORGSTORE_*` environment variables.
    ///
    /// Unset variables leave the defaults in place. The REST pair is
    /// all-or-nothing: a lone endpoint or token is ignored with a
    /// warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = env::var(ENV_DATABASE_URL) {
            if !url.is_empty() {
                config.database_url = Some(url);
            }
        }

        match (env::var(ENV_REST_URL), env::var(ENV_REST_TOKEN)) {
            (Ok(endpoint), Ok(token)) if !endpoint.is_empty() && !token.is_empty() => {
                config.rest = Some(RestConfig::new(endpoint, token));
            }
            (Ok(_), Err(_)) | (Err(_), Ok(_)) => {
                tracing::warn!(
                    "ignoring partial REST configuration: both {} and {} are required",
                    ENV_REST_URL,
                    ENV_REST_TOKEN
                );
            }
            _ => {}
        }

        if let Ok(dir) = env::var(ENV_DATA_DIR) {
            if !dir.is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }

        config
    }

    /// Set the relational connection string.
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Set the remote KV service endpoint and token.
    pub fn with_rest(mut self, endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        self.rest = Some(RestConfig::new(endpoint, token));
        self
    }

    /// Set the filesystem root for the file document.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set HTTP client timeouts.
    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    /// Set connection pool settings.
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Check if a relational connection string is present.
    pub fn has_relational(&self) -> bool {
        self.database_url.is_some()
    }

    /// Check if the remote KV service is fully configured.
    pub fn has_rest(&self) -> bool {
        self.rest.is_some()
    }
}
