//! Single-leader lease over the periodic matching cycle (spec §4.4).
//!
//! Task shape (a periodic `tokio::time::interval` loop gated by a guard)
//! follows the teacher's `run_matchmaking_loop` in `network/server.rs`;
//! the lease primitive itself is the `Store::set_nx_px` /
//! `Store::del_if_eq` pair recommended by spec §9's "Lease safety" note.

use std::time::Duration;

use crate::store::SharedStore;

const LEASE_KEY: &str = "lock:matchmaking";

/// Attempts to claim the tick lease and, on success, runs exactly one
/// matching cycle before releasing it.
pub struct TickLeader {
    store: SharedStore,
    lease_ttl: Duration,
    replica_id: String,
}

impl TickLeader {
    /// Build a Tick Leader identified by `replica_id` (used as the lease
    /// token so `del_if_eq` only releases a lease this replica still
    /// holds).
    pub fn new(store: SharedStore, lease_ttl: Duration, replica_id: String) -> Self {
        Self {
            store,
            lease_ttl,
            replica_id,
        }
    }

    /// Attempt to claim the lease. Returns a [`LeaseGuard`] on success, or
    /// `None` if another replica currently holds it (not an error, spec
    /// §7: "LeaseContention... not an error").
    pub async fn try_acquire(&self) -> Result<Option<LeaseGuard<'_>>, crate::store::StoreError> {
        let acquired = self
            .store
            .set_nx_px(LEASE_KEY, &self.replica_id, self.lease_ttl)
            .await?;
        if acquired {
            Ok(Some(LeaseGuard {
                store: &self.store,
                token: self.replica_id.clone(),
            }))
        } else {
            Ok(None)
        }
    }

    /// Run `cycle` once per `tick_interval`, only when this replica holds
    /// the lease (spec §4.4, §5). Runs until the process is shut down;
    /// callers spawn this as a background task.
    pub async fn run<F, Fut>(&self, tick_interval: Duration, mut cycle: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(tick_interval);
        loop {
            interval.tick().await;
            match self.try_acquire().await {
                Ok(Some(guard)) => {
                    cycle().await;
                    guard.release().await;
                }
                Ok(None) => {} // another replica holds the lease this tick
                Err(e) => {
                    tracing::warn!(error = %e, "tick lease acquisition failed, retrying next tick");
                }
            }
        }
    }
}

/// Holds the tick lease until dropped or explicitly released. Release uses
/// delete-if-value-equals so a releasing replica can never delete a
/// successor's lease acquired after this one expired (spec §9).
pub struct LeaseGuard<'a> {
    store: &'a SharedStore,
    token: String,
}

impl<'a> LeaseGuard<'a> {
    /// Release the lease early, before its TTL would naturally expire it.
    pub async fn release(self) {
        if let Err(e) = self.store.del_if_eq(LEASE_KEY, &self.token).await {
            tracing::warn!(error = %e, "tick lease release failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn only_one_replica_acquires_at_a_time() {
        let store: SharedStore = Arc::new(LocalStore::new());
        let a = TickLeader::new(store.clone(), Duration::from_secs(3), "replica-a".to_string());
        let b = TickLeader::new(store.clone(), Duration::from_secs(3), "replica-b".to_string());

        let guard_a = a.try_acquire().await.unwrap();
        assert!(guard_a.is_some());
        let guard_b = b.try_acquire().await.unwrap();
        assert!(guard_b.is_none());
    }

    #[tokio::test]
    async fn release_allows_next_acquisition() {
        let store: SharedStore = Arc::new(LocalStore::new());
        let a = TickLeader::new(store.clone(), Duration::from_secs(3), "replica-a".to_string());
        let b = TickLeader::new(store.clone(), Duration::from_secs(3), "replica-b".to_string());

        let guard_a = a.try_acquire().await.unwrap().unwrap();
        guard_a.release().await;

        let guard_b = b.try_acquire().await.unwrap();
        assert!(guard_b.is_some());
    }

    #[tokio::test]
    async fn release_never_deletes_a_successors_lease() {
        let store: SharedStore = Arc::new(LocalStore::new());
        // Simulate replica A's lease expiring naturally, then replica B
        // acquiring, then A's delayed release firing against a stale token.
        store
            .set_nx_px("lock:matchmaking", "replica-a", Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store
            .set_nx_px("lock:matchmaking", "replica-b", Duration::from_secs(3))
            .await
            .unwrap();

        let stale_guard = LeaseGuard {
            store: &store,
            token: "replica-a".to_string(),
        };
        stale_guard.release().await;

        assert_eq!(
            store.get_str("lock:matchmaking").await.unwrap(),
            Some("replica-b".to_string())
        );
    }
}
