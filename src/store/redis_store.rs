//! Redis-backed `Store` implementation used when `REDIS_URL` is configured.
//!
//! Crate choice grounded on `instrumentisto-medea`'s `redis` +
//! `deadpool-redis` dependency pair
//! (`examples/other_examples/manifests/instrumentisto-medea/Cargo.toml`).

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use redis::AsyncCommands;

use super::{ScoredMember, Store, StoreError};

/// Lua script implementing the delete-if-value-equals lease release
/// primitive (spec §9, "Lease safety": a token-check release is strictly
/// safer than a bare `DEL`, preventing a releasing replica from deleting a
/// successor's lease under adversarial pauses).
const DEL_IF_EQ_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Redis-backed store for the multi-replica deployment.
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    /// Connect to Redis at `url`, building a connection pool.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PoolConfig::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        // Fail fast if Redis is unreachable rather than surfacing the error
        // lazily on the first matching cycle.
        let mut conn = pool
            .get()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.zadd::<_, _, _, ()>(key, member, score)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.zrem::<_, _, ()>(key, member)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn zrange_oldest(
        &self,
        key: &str,
        limit: usize,
    ) -> Result<Vec<ScoredMember>, StoreError> {
        let mut conn = self.conn().await?;
        let upper = if limit == 0 { 0 } else { limit as isize - 1 };
        let raw: Vec<(String, f64)> = conn
            .zrange_withscores(key, 0, upper)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(raw
            .into_iter()
            .map(|(member, score)| ScoredMember { member, score })
            .collect())
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError> {
        let mut conn = self.conn().await?;
        conn.zscore(key, member)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn set_str(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        match ttl {
            Some(ttl) => conn
                .set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
                .await
                .map_err(|e| StoreError::Backend(e.to_string())),
            None => conn
                .set::<_, _, ()>(key, value)
                .await
                .map_err(|e| StoreError::Backend(e.to_string())),
        }
    }

    async fn get_str(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.get(key)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.sadd::<_, _, ()>(key, member)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.srem::<_, _, ()>(key, member)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        conn.sismember(key, member)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn set_nx_px(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(result.is_some())
    }

    async fn del_if_eq(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let script = redis::Script::new(DEL_IF_EQ_SCRIPT);
        let deleted: i64 = script
            .key(key)
            .arg(value)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(deleted == 1)
    }
}
