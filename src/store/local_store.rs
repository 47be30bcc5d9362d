//! In-process `Store` implementation used when `REDIS_URL` is unset.
//!
//! Spec §6: "if absent, the broker runs single-node, disabling cross-replica
//! lease and fan-out." This backend gives the broker a fully functional
//! single-process mode (and a fast unit-test target) without requiring a
//! live Redis instance. Shape is the teacher's
//! `Arc<RwLock<BTreeMap<...>>>` pattern (`network/server.rs`,
//! `network/session.rs`) generalized to the four primitive shapes the
//! [`Store`] trait exposes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{ScoredMember, Store, StoreError};

struct StringEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl StringEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map(|exp| exp > now).unwrap_or(true)
    }
}

#[derive(Default)]
struct Tables {
    /// key -> (member -> score), emulating a Redis sorted set.
    sorted_sets: HashMap<String, BTreeMap<String, f64>>,
    /// key -> string entry (with optional expiry).
    strings: HashMap<String, StringEntry>,
    /// key -> set members.
    sets: HashMap<String, HashSet<String>>,
}

/// Single-process substitute for a Redis-backed `Store`.
pub struct LocalStore {
    tables: Mutex<Tables>,
}

impl LocalStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
        }
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for LocalStore {
    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap();
        tables
            .sorted_sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(set) = tables.sorted_sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn zrange_oldest(
        &self,
        key: &str,
        limit: usize,
    ) -> Result<Vec<ScoredMember>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let Some(set) = tables.sorted_sets.get(key) else {
            return Ok(Vec::new());
        };
        let mut members: Vec<(&String, &f64)> = set.iter().collect();
        members.sort_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(members
            .into_iter()
            .take(limit)
            .map(|(member, score)| ScoredMember {
                member: member.clone(),
                score: *score,
            })
            .collect())
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .sorted_sets
            .get(key)
            .and_then(|set| set.get(member))
            .copied())
    }

    async fn set_str(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap();
        tables.strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_string(),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn get_str(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let now = Instant::now();
        let live = tables.strings.get(key).map(|e| e.is_live(now)).unwrap_or(false);
        if !live {
            tables.strings.remove(key);
            return Ok(None);
        }
        Ok(tables.strings.get(key).map(|e| e.value.clone()))
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap();
        tables.strings.remove(key);
        tables.sorted_sets.remove(key);
        tables.sets.remove(key);
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap();
        tables
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(set) = tables.sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .sets
            .get(key)
            .map(|set| set.contains(member))
            .unwrap_or(false))
    }

    async fn set_nx_px(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let now = Instant::now();
        let occupied = tables
            .strings
            .get(key)
            .map(|e| e.is_live(now))
            .unwrap_or(false);
        if occupied {
            return Ok(false);
        }
        tables.strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn del_if_eq(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let matches = tables
            .strings
            .get(key)
            .map(|e| e.value == value)
            .unwrap_or(false);
        if matches {
            tables.strings.remove(key);
        }
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sorted_set_range_is_oldest_first() {
        let store = LocalStore::new();
        store.zadd("q", 300.0, "c").await.unwrap();
        store.zadd("q", 100.0, "a").await.unwrap();
        store.zadd("q", 200.0, "b").await.unwrap();

        let range = store.zrange_oldest("q", 2).await.unwrap();
        assert_eq!(range.len(), 2);
        assert_eq!(range[0].member, "a");
        assert_eq!(range[1].member, "b");
    }

    #[tokio::test]
    async fn zrem_is_idempotent_and_disjoint() {
        let store = LocalStore::new();
        store.zadd("q", 1.0, "a").await.unwrap();
        store.zrem("q", "a").await.unwrap();
        store.zrem("q", "a").await.unwrap();
        let range = store.zrange_oldest("q", 10).await.unwrap();
        assert!(range.is_empty());
    }

    #[tokio::test]
    async fn set_nx_px_is_exclusive() {
        let store = LocalStore::new();
        assert!(store
            .set_nx_px("lock", "holder-1", Duration::from_secs(3))
            .await
            .unwrap());
        assert!(!store
            .set_nx_px("lock", "holder-2", Duration::from_secs(3))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn del_if_eq_only_deletes_matching_value() {
        let store = LocalStore::new();
        store
            .set_nx_px("lock", "holder-1", Duration::from_secs(3))
            .await
            .unwrap();
        assert!(!store.del_if_eq("lock", "holder-2").await.unwrap());
        assert!(store.get_str("lock").await.unwrap().is_some());
        assert!(store.del_if_eq("lock", "holder-1").await.unwrap());
        assert!(store.get_str("lock").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_string_reads_as_absent() {
        let store = LocalStore::new();
        store
            .set_str("k", "v", Some(Duration::from_millis(1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.get_str("k").await.unwrap().is_none());
    }
}
