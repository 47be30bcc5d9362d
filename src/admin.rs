//! Admin façade: kick/ban/unban/force-disconnect (spec §6, admin-only
//! inbound events).
//!
//! Holds no state of its own, consistent with spec §9's "Global mutable
//! state" note (the admin surface is a caller of the other components'
//! operations, not an owner of any table).

use crate::ban::{BanGate, BanGateError};
use crate::protocol::ServerMessage;
use crate::session::{Emitter, SessionRegistry, SessionRegistryError};
use crate::socket_registry::{SocketRegistry, SocketRegistryError};

/// Errors surfaced by an admin operation.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    /// The Ban Gate rejected the operation.
    #[error(transparent)]
    Ban(#[from] BanGateError),
    /// The Socket Registry rejected the operation.
    #[error(transparent)]
    Socket(#[from] SocketRegistryError),
    /// The Session Registry rejected the operation.
    #[error(transparent)]
    Session(#[from] SessionRegistryError),
}

/// Administrative operations available to a connection authenticated via
/// the `server-admin` + `MATCHMAKING_SERVER_KEY` handshake path (spec §6).
pub struct AdminFacade<'a> {
    bans: &'a BanGate,
    sockets: &'a SocketRegistry,
    sessions: &'a SessionRegistry,
    emitter: &'a dyn Emitter,
}

impl<'a> AdminFacade<'a> {
    /// Build a façade over the live components an admin command touches.
    pub fn new(
        bans: &'a BanGate,
        sockets: &'a SocketRegistry,
        sessions: &'a SessionRegistry,
        emitter: &'a dyn Emitter,
    ) -> Self {
        Self {
            bans,
            sockets,
            sessions,
            emitter,
        }
    }

    /// `admin_force_disconnect {uid}`: notify and drop the target's
    /// current connection without banning it.
    pub async fn force_disconnect(&self, uid: &str, reason: &str) -> Result<(), AdminError> {
        if let Some(socket_id) = self.sockets.lookup(uid).await? {
            self.emitter.emit(
                &socket_id,
                ServerMessage::Kicked {
                    reason: reason.to_string(),
                },
            );
        }
        self.sessions.handle_skip_match(uid).await?;
        Ok(())
    }

    /// `admin_kick_user {uid, reason}`: alias for a force-disconnect with a
    /// user-facing reason.
    pub async fn kick_user(&self, uid: &str, reason: Option<&str>) -> Result<(), AdminError> {
        self.force_disconnect(uid, reason.unwrap_or("removed by an administrator"))
            .await
    }

    /// `admin_ban_user {uid, reason, durationMinutes}`: ban and
    /// force-disconnect.
    pub async fn ban_user(
        &self,
        uid: &str,
        reason: &str,
        duration_minutes: i64,
        now_ms: i64,
    ) -> Result<(), AdminError> {
        self.bans.ban_user(uid, reason, duration_minutes, now_ms).await?;

        if let Some(socket_id) = self.sockets.lookup(uid).await? {
            let remaining = self.bans.remaining_ban_time(uid, now_ms).await?;
            self.emitter.emit(
                &socket_id,
                ServerMessage::Banned {
                    reason: reason.to_string(),
                    remaining_minutes: if remaining > 0 { remaining / 60_000 } else { remaining },
                    message: "you have been banned".to_string(),
                },
            );
        }
        self.sessions.handle_skip_match(uid).await?;
        Ok(())
    }

    /// `admin_unban_user {uid}`.
    pub async fn unban_user(&self, uid: &str) -> Result<(), AdminError> {
        self.bans.unban_user(uid).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::TracingAnalyticsSink;
    use crate::ice::IceMinter;
    use crate::store::LocalStore;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingEmitter {
        sent: Mutex<Vec<(String, ServerMessage)>>,
    }

    impl Emitter for RecordingEmitter {
        fn emit(&self, socket_id: &str, message: ServerMessage) {
            self.sent.lock().unwrap().push((socket_id.to_string(), message));
        }
    }

    #[tokio::test]
    async fn ban_user_notifies_and_disconnects_online_target() {
        let store: crate::store::SharedStore = Arc::new(LocalStore::new());
        let sockets = SocketRegistry::new(store.clone(), Duration::from_secs(86_400));
        sockets.register("s-alice", "alice").await.unwrap();
        let bans = BanGate::new(store.clone());
        let emitter = RecordingEmitter::default();
        let sessions = SessionRegistry::new(
            store,
            Arc::new(SocketRegistry::new(Arc::new(LocalStore::new()), Duration::from_secs(1))),
            IceMinter::new(None, None),
            Arc::new(TracingAnalyticsSink),
            Arc::new(RecordingEmitter::default()),
            Duration::from_secs(300),
        );
        let facade = AdminFacade::new(&bans, &sockets, &sessions, &emitter);

        facade.ban_user("alice", "spam", 10, 0).await.unwrap();

        assert!(bans.is_banned("alice", 0).await.unwrap().is_some());
        let sent = emitter.sent.lock().unwrap();
        assert!(matches!(sent[0].1, ServerMessage::Banned { .. }));
    }
}
