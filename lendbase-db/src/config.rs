//! Connection pool and repository configuration
//!
//! `DbConfig` builds the deadpool-postgres pool from explicit values or
//! `LENDBASE_DB_*` environment variables. `RepoConfig` carries the knobs
//! of the cached repository protocol: cache enablement, TTLs, the page
//! size cap and the ambient operation deadline.

use std::time::Duration;

use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use lendbase_core::{StoreError, StoreResult};
use tokio_postgres::NoTls;

use lendbase_cache::DEFAULT_PLACEHOLDER_TTL;

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "lendbase".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("LENDBASE_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("LENDBASE_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("LENDBASE_DB_NAME").unwrap_or_else(|_| "lendbase".to_string()),
            user: std::env::var("LENDBASE_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("LENDBASE_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("LENDBASE_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("LENDBASE_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> StoreResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.connect_timeout = Some(self.timeout);
        cfg.pool = Some(PoolConfig::new(self.max_size));

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::backend(format!("failed to create pool: {e}")))
    }
}

/// Configuration for the cached repository protocol.
#[derive(Debug, Clone)]
pub struct RepoConfig {
    /// When false the cache port is bypassed and every read goes to the
    /// backend.
    pub cache_enabled: bool,
    /// Positive-entry TTL used when a descriptor declares none.
    pub default_ttl: Duration,
    /// TTL for negative (placeholder) entries; fixed across kinds.
    pub placeholder_ttl: Duration,
    /// Cap applied to requested page sizes and keyset limits.
    pub max_page_size: u64,
    /// Ambient deadline applied to every backend interaction; expiry
    /// surfaces as `StoreError::Cancelled`.
    pub op_timeout: Option<Duration>,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            default_ttl: Duration::from_secs(3600),
            placeholder_ttl: DEFAULT_PLACEHOLDER_TTL,
            max_page_size: 500,
            op_timeout: None,
        }
    }
}

impl RepoConfig {
    /// Create a repo config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the cache port.
    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Set the fallback positive TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the placeholder TTL.
    pub fn with_placeholder_ttl(mut self, ttl: Duration) -> Self {
        self.placeholder_ttl = ttl;
        self
    }

    /// Set the page size cap.
    pub fn with_max_page_size(mut self, cap: u64) -> Self {
        self.max_page_size = cap;
        self
    }

    /// Set the ambient operation deadline.
    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_config_defaults() {
        let config = DbConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.max_size, 16);
        assert_eq!(config.dbname, "lendbase");
    }

    #[test]
    fn test_repo_config_builder() {
        let config = RepoConfig::new()
            .with_cache_enabled(false)
            .with_default_ttl(Duration::from_secs(120))
            .with_placeholder_ttl(Duration::from_secs(60))
            .with_max_page_size(100)
            .with_op_timeout(Duration::from_secs(5));

        assert!(!config.cache_enabled);
        assert_eq!(config.default_ttl, Duration::from_secs(120));
        assert_eq!(config.placeholder_ttl, Duration::from_secs(60));
        assert_eq!(config.max_page_size, 100);
        assert_eq!(config.op_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_placeholder_ttl_default_is_ten_minutes() {
        assert_eq!(
            RepoConfig::default().placeholder_ttl,
            Duration::from_secs(600)
        );
    }
}
