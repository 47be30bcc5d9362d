//! Time-bounded deny list keyed by uid (spec §4.2).
//!
//! Grounded on the teacher's `AuthError`/validation pattern in
//! `network/auth.rs`: a narrow `thiserror` enum plus plain struct data,
//! generalized from token validation to ban-entry validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::SharedStore;

/// Errors surfaced by the Ban Gate.
#[derive(Debug, Error)]
pub enum BanGateError {
    /// The backing store rejected or failed an operation.
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),

    /// A stored ban entry could not be decoded.
    #[error("corrupt ban entry for {0}")]
    Corrupt(String),
}

/// A ban record (spec §3, "Ban Entry").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanEntry {
    /// Banned user id.
    pub uid: String,
    /// Human-readable reason, surfaced to the client.
    pub reason: String,
    /// Epoch ms the ban was issued.
    pub banned_at: i64,
    /// Epoch ms the ban lapses, or `0` for indefinite.
    pub expires_at: i64,
}

fn ban_key(uid: &str) -> String {
    format!("ban:{uid}")
}

/// Bypasses the Ban Gate entirely (spec §4.2, §9: IP-based moderation for
/// guests is out of scope, so uid-keyed bans never apply to them).
fn is_guest(uid: &str) -> bool {
    uid.starts_with("guest_")
}

/// Time-bounded deny list (spec §4.2).
pub struct BanGate {
    store: SharedStore,
}

impl BanGate {
    /// Build a Ban Gate over `store`.
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Ban `uid` for `duration_minutes` (`0` means indefinite).
    pub async fn ban_user(
        &self,
        uid: &str,
        reason: &str,
        duration_minutes: i64,
        now_ms: i64,
    ) -> Result<(), BanGateError> {
        let expires_at = if duration_minutes > 0 {
            now_ms + duration_minutes * 60_000
        } else {
            0
        };
        let entry = BanEntry {
            uid: uid.to_string(),
            reason: reason.to_string(),
            banned_at: now_ms,
            expires_at,
        };
        let payload =
            serde_json::to_string(&entry).map_err(|e| BanGateError::Corrupt(e.to_string()))?;
        let ttl = if duration_minutes > 0 {
            Some(std::time::Duration::from_secs((duration_minutes * 60) as u64))
        } else {
            None
        };
        self.store.set_str(&ban_key(uid), &payload, ttl).await?;
        Ok(())
    }

    /// Lift a ban before its natural expiry.
    pub async fn unban_user(&self, uid: &str) -> Result<(), BanGateError> {
        self.store.del(&ban_key(uid)).await?;
        Ok(())
    }

    /// Return the ban entry for `uid`, if any and not yet expired. Guests
    /// are never considered banned.
    pub async fn is_banned(
        &self,
        uid: &str,
        now_ms: i64,
    ) -> Result<Option<BanEntry>, BanGateError> {
        if is_guest(uid) {
            return Ok(None);
        }
        let Some(raw) = self.store.get_str(&ban_key(uid)).await? else {
            return Ok(None);
        };
        let entry: BanEntry =
            serde_json::from_str(&raw).map_err(|_| BanGateError::Corrupt(uid.to_string()))?;
        if entry.expires_at != 0 && entry.expires_at <= now_ms {
            return Ok(None);
        }
        Ok(Some(entry))
    }

    /// Remaining ban duration in ms: `>0` remaining, `-1` permanent, `0` not
    /// banned.
    pub async fn remaining_ban_time(
        &self,
        uid: &str,
        now_ms: i64,
    ) -> Result<i64, BanGateError> {
        match self.is_banned(uid, now_ms).await? {
            None => Ok(0),
            Some(entry) if entry.expires_at == 0 => Ok(-1),
            Some(entry) => Ok((entry.expires_at - now_ms).max(0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalStore;
    use std::sync::Arc;

    fn gate() -> BanGate {
        BanGate::new(Arc::new(LocalStore::new()))
    }

    #[tokio::test]
    async fn permanent_ban_reports_negative_one_remaining() {
        let gate = gate();
        gate.ban_user("alice", "spam", 0, 1_000).await.unwrap();
        assert!(gate.is_banned("alice", 2_000).await.unwrap().is_some());
        assert_eq!(gate.remaining_ban_time("alice", 2_000).await.unwrap(), -1);
    }

    #[tokio::test]
    async fn unban_clears_entry() {
        let gate = gate();
        gate.ban_user("alice", "spam", 0, 1_000).await.unwrap();
        gate.unban_user("alice").await.unwrap();
        assert!(gate.is_banned("alice", 2_000).await.unwrap().is_none());
        assert_eq!(gate.remaining_ban_time("alice", 2_000).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn timed_ban_expires_on_read() {
        let gate = gate();
        gate.ban_user("alice", "spam", 1, 0).await.unwrap();
        assert!(gate.is_banned("alice", 30_000).await.unwrap().is_some());
        assert!(gate.is_banned("alice", 60_001).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn guest_bypasses_ban_gate() {
        let gate = gate();
        gate.ban_user("guest_123", "spam", 0, 0).await.unwrap();
        assert!(gate.is_banned("guest_123", 1_000).await.unwrap().is_none());
    }
}
