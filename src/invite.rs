//! Stateless invite relay (spec §6 inbound/outbound invite events).
//!
//! No dedicated component is named for this in spec §2's table — it rides
//! entirely on the Socket Registry's uid→socketId resolution, the same
//! pattern the Signal Router uses (spec §4.7 step 2), so it is grounded on
//! that routing idiom rather than a new table.

use crate::protocol::ServerMessage;
use crate::session::Emitter;
use crate::socket_registry::SocketRegistry;

/// Relays invite events between two uids via their currently bound
/// sockets. Holds no state of its own.
pub struct InviteRelay<'a> {
    sockets: &'a SocketRegistry,
    emitter: &'a dyn Emitter,
}

impl<'a> InviteRelay<'a> {
    /// Build a relay over the Socket Registry and emit boundary.
    pub fn new(sockets: &'a SocketRegistry, emitter: &'a dyn Emitter) -> Self {
        Self { sockets, emitter }
    }

    /// `send_invite {targetUid}`: forward a `receive_invite` to the
    /// target's current socket, or an `invite_error` back to the sender if
    /// the target is offline.
    pub async fn send_invite(
        &self,
        sender_socket: &str,
        sender_uid: &str,
        target_uid: &str,
    ) -> Result<(), crate::socket_registry::SocketRegistryError> {
        match self.sockets.lookup(target_uid).await? {
            Some(target_socket) => {
                self.emitter.emit(
                    &target_socket,
                    ServerMessage::ReceiveInvite {
                        inviter_uid: sender_uid.to_string(),
                    },
                );
            }
            None => {
                self.emitter.emit(
                    sender_socket,
                    ServerMessage::InviteError {
                        message: format!("{target_uid} is offline"),
                    },
                );
            }
        }
        Ok(())
    }

    /// `accept_invite {inviterUid}`: the accepting side re-announces via
    /// the normal handshake flow (handled by the caller); this relay only
    /// needs to confirm the inviter is reachable before the caller proceeds.
    pub async fn accept_invite(
        &self,
        accepter_socket: &str,
        inviter_uid: &str,
    ) -> Result<bool, crate::socket_registry::SocketRegistryError> {
        match self.sockets.lookup(inviter_uid).await? {
            Some(_) => Ok(true),
            None => {
                self.emitter.emit(
                    accepter_socket,
                    ServerMessage::InviteError {
                        message: format!("{inviter_uid} is no longer online"),
                    },
                );
                Ok(false)
            }
        }
    }

    /// `reject_invite {inviterUid}`: notify the inviter their invite was
    /// declined.
    pub async fn reject_invite(
        &self,
        rejecter_uid: &str,
        inviter_uid: &str,
    ) -> Result<(), crate::socket_registry::SocketRegistryError> {
        if let Some(inviter_socket) = self.sockets.lookup(inviter_uid).await? {
            self.emitter.emit(
                &inviter_socket,
                ServerMessage::InviteRejected {
                    target_uid: rejecter_uid.to_string(),
                },
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalStore;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingEmitter {
        sent: Mutex<Vec<(String, ServerMessage)>>,
    }

    impl Emitter for RecordingEmitter {
        fn emit(&self, socket_id: &str, message: ServerMessage) {
            self.sent
                .lock()
                .unwrap()
                .push((socket_id.to_string(), message));
        }
    }

    #[tokio::test]
    async fn send_invite_to_online_target_delivers_receive_invite() {
        let sockets = SocketRegistry::new(Arc::new(LocalStore::new()), Duration::from_secs(86_400));
        sockets.register("s-bob", "bob").await.unwrap();
        let emitter = RecordingEmitter::default();
        let relay = InviteRelay::new(&sockets, &emitter);

        relay.send_invite("s-alice", "alice", "bob").await.unwrap();

        let sent = emitter.sent.lock().unwrap();
        assert_eq!(sent[0].0, "s-bob");
        assert!(matches!(sent[0].1, ServerMessage::ReceiveInvite { .. }));
    }

    #[tokio::test]
    async fn send_invite_to_offline_target_reports_error_to_sender() {
        let sockets = SocketRegistry::new(Arc::new(LocalStore::new()), Duration::from_secs(86_400));
        let emitter = RecordingEmitter::default();
        let relay = InviteRelay::new(&sockets, &emitter);

        relay.send_invite("s-alice", "alice", "bob").await.unwrap();

        let sent = emitter.sent.lock().unwrap();
        assert_eq!(sent[0].0, "s-alice");
        assert!(matches!(sent[0].1, ServerMessage::InviteError { .. }));
    }
}
