//! Pure routing decision for relayed SDP/ICE frames (spec §4.7).
//!
//! Spec §9's design note asks for "a pure function `(frame, registry) →
//! (socketId, frame')`... synchronous over the registry lookup", with the
//! transport emit pushed to a side-effect boundary. `resolve_target` is
//! that pure function (async only because the registry lookups it composes
//! are I/O-bound); `server.rs` owns the actual `emit` call.

use crate::protocol::SignalFrame;
use crate::session::SessionRegistry;
use crate::socket_registry::SocketRegistry;

/// Which inbound signaling event produced a [`SignalFrame`], carried through
/// so the outbound `Signal` message can report `kind` faithfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// Game-channel SDP offer.
    Offer,
    /// Game-channel SDP answer.
    Answer,
    /// Game-channel ICE candidate.
    IceCandidate,
    /// Video-channel SDP offer.
    VideoOffer,
    /// Video-channel SDP answer.
    VideoAnswer,
    /// Video-channel ICE candidate.
    VideoIceCandidate,
}

impl SignalKind {
    /// Wire name emitted in the relayed `Signal` message.
    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice-candidate",
            SignalKind::VideoOffer => "video-offer",
            SignalKind::VideoAnswer => "video-answer",
            SignalKind::VideoIceCandidate => "video-ice-candidate",
        }
    }
}

/// Resolve the destination socket id for a relayed frame (spec §4.7's
/// four-step precedence). Returns `None` if the frame should be dropped
/// (loopback, or no resolvable target).
pub async fn resolve_target(
    sockets: &SocketRegistry,
    sessions: &SessionRegistry,
    sender_uid: &str,
    frame: &SignalFrame,
) -> Result<Option<String>, RouterError> {
    if let Some(to) = &frame.to {
        return Ok(Some(to.clone()));
    }

    if let Some(target_uid) = &frame.target_uid {
        if target_uid == sender_uid {
            return Ok(None); // loopback protection
        }
        return sockets
            .lookup(target_uid)
            .await
            .map_err(|e| RouterError::SocketRegistry(e.to_string()));
    }

    match sessions
        .opponent_uid_for(sender_uid)
        .await
        .map_err(|e| RouterError::Session(e.to_string()))?
    {
        Some(opponent_uid) if opponent_uid != sender_uid => sockets
            .lookup(&opponent_uid)
            .await
            .map_err(|e| RouterError::SocketRegistry(e.to_string())),
        _ => Ok(None),
    }
}

/// Errors surfaced while resolving a routing target.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// A Socket Registry lookup failed.
    #[error("socket registry error: {0}")]
    SocketRegistry(String),
    /// A Session Registry lookup failed.
    #[error("session registry error: {0}")]
    Session(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::TracingAnalyticsSink;
    use crate::ice::IceMinter;
    use crate::protocol::ServerMessage;
    use crate::session::{Emitter, Role, SessionEntry};
    use crate::store::LocalStore;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    struct NoopEmitter;
    impl Emitter for NoopEmitter {
        fn emit(&self, _socket_id: &str, _message: ServerMessage) {}
    }

    fn frame(to: Option<&str>, target_uid: Option<&str>) -> SignalFrame {
        SignalFrame {
            payload: json!({}),
            to: to.map(str::to_string),
            target_uid: target_uid.map(str::to_string),
        }
    }

    async fn harness() -> (Arc<SocketRegistry>, SessionRegistry) {
        let store: crate::store::SharedStore = Arc::new(LocalStore::new());
        let sockets = Arc::new(SocketRegistry::new(store.clone(), Duration::from_secs(86_400)));
        let sessions = SessionRegistry::new(
            store,
            sockets.clone(),
            IceMinter::new(None, None),
            Arc::new(TracingAnalyticsSink),
            Arc::new(NoopEmitter),
            Duration::from_secs(300),
        );
        (sockets, sessions)
    }

    #[tokio::test]
    async fn direct_socket_target_wins_over_everything_else() {
        let (sockets, sessions) = harness().await;
        let target = resolve_target(&sockets, &sessions, "alice", &frame(Some("s-direct"), Some("bob")))
            .await
            .unwrap();
        assert_eq!(target, Some("s-direct".to_string()));
    }

    #[tokio::test]
    async fn uid_target_resolves_via_socket_registry() {
        let (sockets, sessions) = harness().await;
        sockets.register("s-bob", "bob").await.unwrap();
        let target = resolve_target(&sockets, &sessions, "alice", &frame(None, Some("bob")))
            .await
            .unwrap();
        assert_eq!(target, Some("s-bob".to_string()));
    }

    #[tokio::test]
    async fn loopback_target_uid_is_dropped() {
        let (sockets, sessions) = harness().await;
        sockets.register("s-alice", "alice").await.unwrap();
        let target = resolve_target(&sockets, &sessions, "alice", &frame(None, Some("alice")))
            .await
            .unwrap();
        assert_eq!(target, None);
    }

    #[tokio::test]
    async fn falls_back_to_session_opponent_lookup() {
        let (sockets, sessions) = harness().await;
        sockets.register("s-bob", "bob").await.unwrap();
        sessions
            .save_session_for_test(
                "alice",
                SessionEntry {
                    room_id: "r1".to_string(),
                    opponent_uid: "bob".to_string(),
                    role: Role::A,
                    start_time: 0,
                },
            )
            .await
            .unwrap();

        let target = resolve_target(&sockets, &sessions, "alice", &frame(None, None))
            .await
            .unwrap();
        assert_eq!(target, Some("s-bob".to_string()));
    }
}
