//! Redis service handing out managed connections.

use redis::aio::ConnectionManager;
use tracing::{debug, info};

use crate::{RedisConfig, RedisError, Result};

/// Redis service wrapping a reconnecting, multiplexed connection.
///
/// [`ConnectionManager`] is cheap to clone; every clone shares the same
/// underlying connection, so lease stores and queues can each hold their own
/// handle.
#[derive(Clone)]
pub struct RedisService {
    config: RedisConfig,
    conn: ConnectionManager,
}

impl RedisService {
    /// Connect using the given configuration.
    pub async fn connect(config: RedisConfig) -> Result<Self> {
        let url = config.connection_url()?;
        let client =
            redis::Client::open(url).map_err(|e| RedisError::Connection(e.to_string()))?;

        debug!(url = %config.url, "Connecting to Redis");

        let conn = tokio::time::timeout(config.connection_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| RedisError::Timeout)?
            .map_err(|e| RedisError::Connection(e.to_string()))?;

        info!(url = %config.url, database = ?config.database, "Redis connection ready");

        Ok(Self { config, conn })
    }

    /// Wrap an existing connection manager.
    pub fn from_connection(config: RedisConfig, conn: ConnectionManager) -> Self {
        Self { config, conn }
    }

    /// Get the configuration.
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Get a handle to the shared connection.
    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }

    /// Check if the connection is healthy.
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let pong: String = tokio::time::timeout(
            self.config.command_timeout,
            redis::cmd("PING").query_async(&mut conn),
        )
        .await
        .map_err(|_| RedisError::Timeout)??;

        debug!(reply = %pong, "Redis health check");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_bad_config() {
        let config = RedisConfig::new("http://localhost:6379");
        let result = RedisService::connect(config).await;
        assert!(matches!(result, Err(RedisError::Config(_))));
    }

    #[test]
    fn test_tls_url_opens_client_only_with_tls_feature() {
        let config = RedisConfig::builder()
            .url("redis://localhost:6380")
            .tls(true)
            .build();
        let url = config.connection_url().unwrap();
        assert!(url.starts_with("rediss://"));

        // Without the feature the client refuses rediss:// URLs
        assert_eq!(redis::Client::open(url).is_ok(), cfg!(feature = "tls"));
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_health_check() {
        let config = RedisConfig::from_env().build();
        let redis = RedisService::connect(config).await.unwrap();
        redis.health_check().await.unwrap();
    }
}
