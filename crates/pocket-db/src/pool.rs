//! Database connection pool management.

use std::str::FromStr;
use std::time::{Duration, Instant};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info, warn};

use pocket_core::{defaults, Error, Result};

/// Default connection acquire timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Pool configuration options.
///
/// | Variable | Default |
/// |----------|---------|
/// | `POCKET_DATABASE_URL` | `sqlite://pocket.db?mode=rwc` |
/// | `POCKET_DB_MAX_CONNECTIONS` | 5 |
/// | `POCKET_DB_BUSY_TIMEOUT_MS` | 5000 |
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// SQLite URL, e.g. `sqlite://pocket.db` or `sqlite::memory:`.
    pub database_url: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// How long a write waits on a locked database.
    pub busy_timeout: Duration,
    /// Connection acquire timeout.
    pub connect_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            database_url: defaults::DATABASE_URL.to_string(),
            max_connections: defaults::DB_MAX_CONNECTIONS,
            busy_timeout: Duration::from_millis(defaults::DB_BUSY_TIMEOUT_MS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("POCKET_DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(n) = std::env::var("POCKET_DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.max_connections = n;
        }
        if let Some(ms) = std::env::var("POCKET_DB_BUSY_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.busy_timeout = Duration::from_millis(ms);
        }
        config
    }

    /// Set the database URL.
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the busy timeout.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    fn is_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }
}

/// Create a SQLite pool for the given URL with default settings.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    create_pool_with_config(PoolConfig::default().database_url(database_url)).await
}

/// Create a SQLite pool with custom configuration.
///
/// An in-memory database lives only as long as its connection, so memory
/// URLs get a single connection that is never recycled.
pub async fn create_pool_with_config(config: PoolConfig) -> Result<SqlitePool> {
    let start = Instant::now();
    let memory = config.is_memory();

    info!(
        subsystem = "db",
        component = "pool",
        op = "create",
        max_connections = config.max_connections,
        memory,
        "Creating database connection pool"
    );

    let mut connect = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(|e| Error::Config(format!("invalid database url: {e}")))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(config.busy_timeout);
    if !memory {
        connect = connect.journal_mode(SqliteJournalMode::Wal);
    }

    let options = if memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(config.max_connections)
    };

    let pool = options
        .acquire_timeout(config.connect_timeout)
        .connect_with(connect)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        op = "established",
        pool_size = pool.size(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Database connection pool established"
    );
    Ok(pool)
}

/// Log current pool health metrics.
pub fn log_pool_metrics(pool: &SqlitePool) {
    let size = pool.size();
    let idle = pool.num_idle();

    debug!(
        subsystem = "db",
        component = "pool",
        op = "metrics",
        pool_size = size,
        pool_idle = idle,
        "Pool health check"
    );

    if idle == 0 && size > 1 {
        warn!(
            subsystem = "db",
            component = "pool",
            pool_size = size,
            "Connection pool has no idle connections"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_builder() {
        let config = PoolConfig::new()
            .database_url("sqlite::memory:")
            .max_connections(2)
            .busy_timeout(Duration::from_millis(250));

        assert_eq!(config.max_connections, 2);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert!(config.is_memory());
    }

    #[test]
    fn test_file_url_is_not_memory() {
        assert!(!PoolConfig::default().is_memory());
    }

    #[tokio::test]
    async fn test_memory_pool_single_connection() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&pool).await.unwrap();
        assert_eq!(one, 1);
        assert!(pool.size() <= 1);
        log_pool_metrics(&pool);
    }
}
