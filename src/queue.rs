//! Two partitioned, time-ordered waiting queues (spec §3, §4.3).
//!
//! Storage shape mirrors the teacher's `QueueEntry`/matchmaking queue in
//! `network/server.rs` (`mode`, `queued_at`, a channel back to the
//! connection), generalized to persist through the [`crate::store::Store`]
//! keyspace instead of an in-process `Vec`, and split into the `male` /
//! `female` partitions spec §3 requires.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::SharedStore;

/// Errors surfaced by the Queue Store.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The backing store rejected or failed an operation.
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),

    /// A stored payload could not be decoded.
    #[error("corrupt queue payload for {0}")]
    Corrupt(String),
}

/// Partition a [`QueueUser`] is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    /// Male partition.
    Male,
    /// Female partition.
    Female,
}

impl Gender {
    fn partition_key(self) -> &'static str {
        match self {
            Gender::Male => "queue:male",
            Gender::Female => "queue:female",
        }
    }
}

/// The channel a waiter wants to be matched for (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Open-ended matchmaking for the game channel.
    Random,
    /// Video-chat matchmaking.
    Video,
}

/// Soft preferences, already filtered by tier at admission time (spec §3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// Desired partner gender, if expressed and retained for this tier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    /// Desired partner location, if expressed and retained for this tier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Subscription tier, governing how much of a preference survives
/// admission (spec §3: FREE strips both, GOLD strips location, DIAMOND
/// keeps both; DIAMOND also never implicitly widens past stage 1, spec
/// §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    /// Free tier: location and gender preference both stripped.
    Free,
    /// Gold tier: location preference stripped, gender preference kept.
    Gold,
    /// Diamond tier: full preferences kept, and gender never widens.
    Diamond,
}

impl Tier {
    /// Apply this tier's stripping rule to a raw preference request.
    pub fn filter(self, raw: Preferences) -> Preferences {
        match self {
            Tier::Free => Preferences::default(),
            Tier::Gold => Preferences {
                gender: raw.gender,
                location: None,
            },
            Tier::Diamond => raw,
        }
    }
}

/// A waiting user (spec §3, "QueueUser").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueUser {
    /// Stable user id; a `guest_` prefix disables stats/ban (spec §3).
    pub uid: String,
    /// Current duplex channel id.
    pub socket_id: String,
    /// Partition this user belongs to.
    pub gender: Gender,
    /// Opaque location string, if supplied and retained.
    pub location: Option<String>,
    /// Subscription tier.
    pub tier: Tier,
    /// Matching channel requested.
    pub mode: Mode,
    /// Tier-filtered soft preferences.
    pub preferences: Preferences,
    /// Epoch ms this user joined the queue.
    pub joined_at: i64,
    /// Preference-relaxation stage, recomputed dynamically by the Match
    /// Engine rather than stored authoritatively (spec §4.5); persisted here
    /// only as the last-observed value for diagnostics.
    pub widen_stage: u8,
    /// Whether `start_bot_mode` has already fired for this waiter
    /// (idempotence guard, spec §8).
    pub bot_mode_active: bool,
}

fn payload_key(uid: &str) -> String {
    format!("queue:user:{uid}")
}

/// Two ordered waiting partitions plus the uid-keyed payload store (spec
/// §4.3).
pub struct QueueStore {
    store: SharedStore,
}

impl QueueStore {
    /// Build a Queue Store over `store`.
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Admit `user`, first removing any prior entry for the same uid
    /// (idempotence / self-match prevention, spec §4.3).
    pub async fn join_queue(&self, user: QueueUser) -> Result<(), QueueError> {
        self.remove_by_uid(&user.uid).await?;

        let payload = serde_json::to_string(&user)
            .map_err(|e| QueueError::Corrupt(e.to_string()))?;
        self.store
            .set_str(&payload_key(&user.uid), &payload, None)
            .await?;
        self.store
            .zadd(
                user.gender.partition_key(),
                user.joined_at as f64,
                &user.uid,
            )
            .await?;
        Ok(())
    }

    /// Remove the waiter bound to `socket_id`, if any. O(1) lookup via the
    /// socket registry is the caller's responsibility; this method removes
    /// by uid once resolved.
    pub async fn remove_by_socket(
        &self,
        socket_id: &str,
        socket_registry: &crate::socket_registry::SocketRegistry,
    ) -> Result<(), QueueError> {
        if let Some(uid) = socket_registry.uid_for_socket(socket_id).await.map_err(|e| {
            QueueError::Corrupt(format!("socket registry lookup failed: {e}"))
        })? {
            self.remove_by_uid(&uid).await?;
        }
        Ok(())
    }

    /// Remove `uid` from both partitions and the payload store.
    pub async fn remove_by_uid(&self, uid: &str) -> Result<(), QueueError> {
        self.store.zrem(Gender::Male.partition_key(), uid).await?;
        self.store.zrem(Gender::Female.partition_key(), uid).await?;
        self.store.del(&payload_key(uid)).await?;
        Ok(())
    }

    /// Return up to `limit` uids from `gender`'s partition, oldest first.
    pub async fn range(&self, gender: Gender, limit: usize) -> Result<Vec<String>, QueueError> {
        let scored = self.store.zrange_oldest(gender.partition_key(), limit).await?;
        Ok(scored.into_iter().map(|s| s.member).collect())
    }

    /// Hydrate a single uid's [`QueueUser`] payload. Returns `None` if
    /// missing or malformed (spec §4.5 step 2: "skipped", not an error).
    pub async fn hydrate(&self, uid: &str) -> Result<Option<QueueUser>, QueueError> {
        let Some(raw) = self.store.get_str(&payload_key(uid)).await? else {
            return Ok(None);
        };
        Ok(serde_json::from_str(&raw).ok())
    }

    /// Persist `user`'s payload without touching partition membership
    /// (used by the Match Engine to flip `bot_mode_active`).
    pub async fn save_payload(&self, user: &QueueUser) -> Result<(), QueueError> {
        let payload =
            serde_json::to_string(user).map_err(|e| QueueError::Corrupt(e.to_string()))?;
        self.store.set_str(&payload_key(&user.uid), &payload, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalStore;
    use std::sync::Arc;

    fn sample(uid: &str, gender: Gender, joined_at: i64) -> QueueUser {
        QueueUser {
            uid: uid.to_string(),
            socket_id: format!("sock-{uid}"),
            gender,
            location: None,
            tier: Tier::Free,
            mode: Mode::Random,
            preferences: Preferences::default(),
            joined_at,
            widen_stage: 0,
            bot_mode_active: false,
        }
    }

    fn store() -> QueueStore {
        QueueStore::new(Arc::new(LocalStore::new()))
    }

    #[tokio::test]
    async fn join_then_remove_restores_prior_state() {
        let qs = store();
        qs.join_queue(sample("alice", Gender::Female, 100)).await.unwrap();
        qs.remove_by_uid("alice").await.unwrap();
        assert!(qs.range(Gender::Female, 10).await.unwrap().is_empty());
        assert!(qs.hydrate("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejoin_replaces_prior_entry() {
        let qs = store();
        qs.join_queue(sample("alice", Gender::Female, 100)).await.unwrap();
        qs.join_queue(sample("alice", Gender::Female, 200)).await.unwrap();
        let range = qs.range(Gender::Female, 10).await.unwrap();
        assert_eq!(range, vec!["alice".to_string()]);
        let hydrated = qs.hydrate("alice").await.unwrap().unwrap();
        assert_eq!(hydrated.joined_at, 200);
    }

    #[tokio::test]
    async fn partitions_are_disjoint() {
        let qs = store();
        qs.join_queue(sample("alice", Gender::Female, 100)).await.unwrap();
        qs.join_queue(sample("bob", Gender::Male, 100)).await.unwrap();
        assert_eq!(qs.range(Gender::Female, 10).await.unwrap(), vec!["alice"]);
        assert_eq!(qs.range(Gender::Male, 10).await.unwrap(), vec!["bob"]);
    }

    #[tokio::test]
    async fn range_is_oldest_first() {
        let qs = store();
        qs.join_queue(sample("c", Gender::Male, 300)).await.unwrap();
        qs.join_queue(sample("a", Gender::Male, 100)).await.unwrap();
        qs.join_queue(sample("b", Gender::Male, 200)).await.unwrap();
        assert_eq!(qs.range(Gender::Male, 10).await.unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn tier_filter_strips_preferences_per_table() {
        let raw = Preferences {
            gender: Some(Gender::Male),
            location: Some("US".to_string()),
        };
        assert_eq!(Tier::Free.filter(raw.clone()), Preferences::default());
        assert_eq!(
            Tier::Gold.filter(raw.clone()),
            Preferences {
                gender: Some(Gender::Male),
                location: None
            }
        );
        assert_eq!(Tier::Diamond.filter(raw.clone()), raw);
    }
}
