//! Bidirectional socket-id ↔ uid binding (spec §4.1).
//!
//! Shape generalized from the teacher's `ConnectedClient` bookkeeping in
//! `network/server.rs`, backed by the typed [`crate::store::Store`] keyspace
//! instead of an in-process `BTreeMap<SocketAddr, _>` so bindings survive
//! across replicas.

use thiserror::Error;

use crate::store::SharedStore;

/// Errors surfaced by the Socket Registry.
#[derive(Debug, Error)]
pub enum SocketRegistryError {
    /// The backing store rejected or failed an operation.
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),
}

fn socket_key(socket_id: &str) -> String {
    format!("socket:uid:{socket_id}")
}

fn user_key(uid: &str) -> String {
    format!("user:socket:{uid}")
}

const ONLINE_USERS_KEY: &str = "users:online";

/// A user is exempt from the online-presence set (not stats, not matchmaking
/// visibility) if its uid carries this prefix (spec §3, §9).
fn is_guest_or_bot(uid: &str) -> bool {
    uid.starts_with("guest_") || uid.starts_with("bot_")
}

/// Bidirectional socket-id ↔ uid registry (spec §4.1).
pub struct SocketRegistry {
    store: SharedStore,
    binding_ttl: std::time::Duration,
}

impl SocketRegistry {
    /// Build a registry over `store`, with bindings expiring after `binding_ttl`
    /// of inactivity (spec §6: `socket:uid:{socketId}` / `user:socket:{uid}`
    /// both carry a 24h TTL as a crash-safety backstop).
    pub fn new(store: SharedStore, binding_ttl: std::time::Duration) -> Self {
        Self { store, binding_ttl }
    }

    /// Bind `socketId` to `uid`, superseding any prior socket bound to that
    /// uid. Adds `uid` to the online set unless it is a guest or bot.
    pub async fn register(&self, socket_id: &str, uid: &str) -> Result<(), SocketRegistryError> {
        self.store
            .set_str(&socket_key(socket_id), uid, Some(self.binding_ttl))
            .await?;
        self.store
            .set_str(&user_key(uid), socket_id, Some(self.binding_ttl))
            .await?;
        if !is_guest_or_bot(uid) {
            self.store.sadd(ONLINE_USERS_KEY, uid).await?;
        }
        Ok(())
    }

    /// Resolve a uid's current socket id, if bound.
    pub async fn lookup(&self, uid: &str) -> Result<Option<String>, SocketRegistryError> {
        Ok(self.store.get_str(&user_key(uid)).await?)
    }

    /// Resolve a socket id's bound uid, if any.
    pub async fn uid_for_socket(
        &self,
        socket_id: &str,
    ) -> Result<Option<String>, SocketRegistryError> {
        Ok(self.store.get_str(&socket_key(socket_id)).await?)
    }

    /// Unbind `socketId`: the forward binding is always dropped; the reverse
    /// binding is dropped only if it still points at this socket (so a newer
    /// tab is never evicted by an older tab's disconnect).
    pub async fn unregister(&self, socket_id: &str) -> Result<(), SocketRegistryError> {
        let Some(uid) = self.store.get_str(&socket_key(socket_id)).await? else {
            return Ok(());
        };
        self.store.del(&socket_key(socket_id)).await?;

        if self.store.get_str(&user_key(&uid)).await?.as_deref() == Some(socket_id) {
            self.store.del(&user_key(&uid)).await?;
            self.store.srem(ONLINE_USERS_KEY, &uid).await?;
        }
        Ok(())
    }

    /// Whether `uid` is currently marked online.
    pub async fn is_online(&self, uid: &str) -> Result<bool, SocketRegistryError> {
        Ok(self.store.sismember(ONLINE_USERS_KEY, uid).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn registry() -> SocketRegistry {
        SocketRegistry::new(Arc::new(LocalStore::new()), Duration::from_secs(86_400))
    }

    #[tokio::test]
    async fn register_binds_both_directions() {
        let reg = registry();
        reg.register("s1", "alice").await.unwrap();
        assert_eq!(reg.lookup("alice").await.unwrap(), Some("s1".to_string()));
        assert_eq!(
            reg.uid_for_socket("s1").await.unwrap(),
            Some("alice".to_string())
        );
        assert!(reg.is_online("alice").await.unwrap());
    }

    #[tokio::test]
    async fn newer_registration_supersedes_older() {
        let reg = registry();
        reg.register("s1", "alice").await.unwrap();
        reg.register("s2", "alice").await.unwrap();
        assert_eq!(reg.lookup("alice").await.unwrap(), Some("s2".to_string()));
    }

    #[tokio::test]
    async fn older_socket_unregister_does_not_evict_newer() {
        let reg = registry();
        reg.register("s1", "alice").await.unwrap();
        reg.register("s2", "alice").await.unwrap();
        reg.unregister("s1").await.unwrap();
        assert_eq!(reg.lookup("alice").await.unwrap(), Some("s2".to_string()));
        assert!(reg.is_online("alice").await.unwrap());
    }

    #[tokio::test]
    async fn unregister_current_socket_clears_binding() {
        let reg = registry();
        reg.register("s1", "alice").await.unwrap();
        reg.unregister("s1").await.unwrap();
        assert_eq!(reg.lookup("alice").await.unwrap(), None);
        assert!(!reg.is_online("alice").await.unwrap());
    }

    #[tokio::test]
    async fn guest_and_bot_uids_are_excluded_from_online_set() {
        let reg = registry();
        reg.register("s1", "guest_123").await.unwrap();
        assert!(!reg.is_online("guest_123").await.unwrap());
    }
}
