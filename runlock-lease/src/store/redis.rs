//! Redis lease store
//!
//! Maps the lease primitives onto single Redis commands: `SET NX`, `GET`,
//! `GETSET`, `DEL` for per-key leases and `HSETNX`, `HGET`, `HSET`, `HDEL`
//! for namespaced ones. Conditional deletes use Lua scripts so the compare
//! and the delete happen atomically.

use crate::error::LeaseResult;
use crate::store::LeaseStore;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use runlock_redis::{RedisConfig, RedisService};
use tracing::{debug, trace};

const DELETE_IF_EQUALS: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("del", KEYS[1])
    else
        return 0
    end
"#;

const FIELD_DELETE_IF_EQUALS: &str = r#"
    if redis.call("hget", KEYS[1], ARGV[1]) == ARGV[2] then
        return redis.call("hdel", KEYS[1], ARGV[1])
    else
        return 0
    end
"#;

/// Redis-backed lease store
///
/// Cloning is cheap: clones share the underlying multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Create a store over an existing connection.
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Connect using a Redis configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the connection fails.
    pub async fn connect(config: RedisConfig) -> LeaseResult<Self> {
        debug!(url = %config.url, "Connecting to Redis for leases");
        let service = RedisService::connect(config).await?;
        Ok(Self::from_service(&service))
    }

    /// Share the connection of a running [`RedisService`].
    pub fn from_service(service: &RedisService) -> Self {
        Self::new(service.connection())
    }
}

#[async_trait]
impl LeaseStore for RedisStore {
    async fn set_if_absent(&self, key: &str, value: &str) -> LeaseResult<bool> {
        trace!(key = %key, "Redis SET NX");
        let mut conn = self.conn.clone();

        // Replies OK when set, nil when the key exists
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }

    async fn get(&self, key: &str) -> LeaseResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_unconditional(&self, key: &str, value: &str) -> LeaseResult<Option<String>> {
        trace!(key = %key, "Redis GETSET");
        let mut conn = self.conn.clone();
        let previous: Option<String> = redis::cmd("GETSET")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(previous)
    }

    async fn delete(&self, key: &str) -> LeaseResult<()> {
        let mut conn = self.conn.clone();
        let _: u32 = conn.del(key).await?;
        Ok(())
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> LeaseResult<bool> {
        let mut conn = self.conn.clone();
        let deleted: i32 = redis::Script::new(DELETE_IF_EQUALS)
            .key(key)
            .arg(value)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    async fn field_set_if_absent(
        &self,
        namespace: &str,
        field: &str,
        value: &str,
    ) -> LeaseResult<bool> {
        trace!(namespace = %namespace, field = %field, "Redis HSETNX");
        let mut conn = self.conn.clone();
        let set: i32 = redis::cmd("HSETNX")
            .arg(namespace)
            .arg(field)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(set == 1)
    }

    async fn field_get(&self, namespace: &str, field: &str) -> LeaseResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.hget(namespace, field).await?;
        Ok(value)
    }

    async fn field_set(&self, namespace: &str, field: &str, value: &str) -> LeaseResult<()> {
        let mut conn = self.conn.clone();
        let _: i32 = conn.hset(namespace, field, value).await?;
        Ok(())
    }

    async fn field_delete(&self, namespace: &str, field: &str) -> LeaseResult<()> {
        let mut conn = self.conn.clone();
        let _: i32 = conn.hdel(namespace, field).await?;
        Ok(())
    }

    async fn field_delete_if_equals(
        &self,
        namespace: &str,
        field: &str,
        value: &str,
    ) -> LeaseResult<bool> {
        let mut conn = self.conn.clone();
        let deleted: i32 = redis::Script::new(FIELD_DELETE_IF_EQUALS)
            .key(namespace)
            .arg(field)
            .arg(value)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    fn store_type(&self) -> &'static str {
        "redis"
    }
}
