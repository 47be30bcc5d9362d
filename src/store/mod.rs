//! Typed keyspace accessor layer.
//!
//! Spec §6 lists the namespaced tables (`queue:male`, `queue:female`,
//! `queue:user:{uid}`, `room:{roomId}`, `session:{uid}`, `socket:uid:{sid}`,
//! `user:socket:{uid}`, `users:online`, `ban:{uid}`, `lock:matchmaking`) as
//! the only process-wide state, each owned by exactly one component. This
//! module centralizes the primitive operations against that keyspace behind
//! one trait so no component has to know whether it is talking to Redis or
//! an in-process substitute (design note, spec §9: "centralize their
//! keyspace under a typed accessor layer rather than ad-hoc
//! string-concatenation sites").
//!
//! Two implementations exist: [`redis_store::RedisStore`] for the
//! multi-replica deployment, and [`local_store::LocalStore`] for the
//! single-node fallback used when `REDIS_URL` is unset.

pub mod local_store;
pub mod redis_store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use local_store::LocalStore;
pub use redis_store::RedisStore;

/// Errors surfaced by a [`Store`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing transport (Redis connection, pool checkout) failed.
    #[error("backend error: {0}")]
    Backend(String),

    /// A value stored under a key could not be deserialized as expected.
    #[error("corrupt value at key {0}")]
    Corrupt(String),
}

/// A single matched (member, score) pair returned from a range query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    /// The set member (for queue partitions, a uid).
    pub member: String,
    /// The score the member was inserted with (for queue partitions,
    /// `joinedAt` in epoch milliseconds).
    pub score: f64,
}

/// Primitive operations against the namespaced external store.
///
/// Every domain component (Queue Store, Socket Registry, Ban Gate, Session
/// Registry, Tick Leader) is written against this trait rather than a
/// concrete backend, so unit tests run against [`LocalStore`] while
/// production runs against [`RedisStore`].
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or update `member` in the sorted set at `key` with `score`.
    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<(), StoreError>;

    /// Remove `member` from the sorted set at `key`. No-op if absent.
    async fn zrem(&self, key: &str, member: &str) -> Result<(), StoreError>;

    /// Return up to `limit` members from `key`, oldest (lowest score) first.
    async fn zrange_oldest(
        &self,
        key: &str,
        limit: usize,
    ) -> Result<Vec<ScoredMember>, StoreError>;

    /// Return the score of `member` in the sorted set at `key`, if present.
    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError>;

    /// Set a string value, optionally with an expiry.
    async fn set_str(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    /// Read a string value, or `None` if absent or expired.
    async fn get_str(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Delete a key unconditionally. No-op if absent.
    async fn del(&self, key: &str) -> Result<(), StoreError>;

    /// Add `member` to the set at `key`.
    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError>;

    /// Remove `member` from the set at `key`.
    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError>;

    /// Check whether `member` is in the set at `key`.
    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Atomically set `key` to `value` only if absent, with a TTL. Returns
    /// `true` if the lock/lease was acquired.
    async fn set_nx_px(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Atomically delete `key` only if its current value equals `value`
    /// (the safe lease-release primitive from the Lease Safety design
    /// note). Returns `true` if the key was deleted.
    async fn del_if_eq(&self, key: &str, value: &str) -> Result<bool, StoreError>;
}

/// A shared, cloneable handle to a [`Store`] implementation.
pub type SharedStore = Arc<dyn Store>;

/// Build the appropriate [`Store`] backend for the given configuration:
/// [`RedisStore`] when `redis_url` is set, [`LocalStore`] otherwise.
pub async fn build_store(redis_url: Option<&str>) -> Result<SharedStore, StoreError> {
    match redis_url {
        Some(url) => {
            let store = RedisStore::connect(url).await?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(LocalStore::new())),
    }
}
