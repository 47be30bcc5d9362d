//! Pairing lifecycle: PendingRoom → ActiveSession → torn down (spec §4.6).
//!
//! State-machine shape and `SessionEntry`/teardown flow are generalized
//! from the teacher's `MatchSession`/`SessionManager` in
//! `network/session.rs` (state enum, `BTreeMap` of live entries keyed by
//! id, explicit `finalize`); persistence moves from an in-process map to
//! the [`crate::store::Store`] keyspace per spec §6's `room:{roomId}` /
//! `session:{uid}` prefixes. The emit boundary follows spec §9's design
//! note: routing/state decisions stay synchronous over the registry, and
//! the transport-level push goes through the [`Emitter`] trait so it is
//! substitutable in tests.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analytics::{AnalyticsEvent, AnalyticsSink};
use crate::ice::IceMinter;
use crate::protocol::{IceServers, ServerMessage};
use crate::queue::{Mode, QueueUser};
use crate::socket_registry::SocketRegistry;
use crate::store::SharedStore;

/// Side-effect boundary for pushing a message to a live socket (spec §9,
/// "Async / callback control flow": "push the transport-level emit to a
/// side-effect boundary so it is unit-testable").
pub trait Emitter: Send + Sync {
    /// Deliver `message` to `socket_id`, best-effort. Must not block.
    fn emit(&self, socket_id: &str, message: ServerMessage);
}

/// Errors surfaced by the Session Registry.
#[derive(Debug, Error)]
pub enum SessionRegistryError {
    /// The backing store rejected or failed an operation.
    #[error("store error: {0}")]
    Store(String),

    /// A Queue Store operation failed mid-match (wrapped to avoid a direct
    /// dependency cycle between `match_engine` and `queue`'s error type).
    #[error("queue error: {0}")]
    Queue(String),

    /// A stored room/session payload could not be decoded.
    #[error("corrupt session payload: {0}")]
    Corrupt(String),
}

impl From<crate::store::StoreError> for SessionRegistryError {
    fn from(e: crate::store::StoreError) -> Self {
        SessionRegistryError::Store(e.to_string())
    }
}

/// One side of a pairing, as stored on a [`PendingRoom`] (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomParty {
    /// Stable user id.
    pub uid: String,
    /// Socket id at the time the room was created (or last re-emitted).
    pub socket_id: String,
}

/// A WebRTC sub-channel the peers must confirm before the room finalizes
/// (spec §3, §9 open question resolution: derived purely from `mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    /// The game data channel.
    Game,
    /// The video media channel.
    Video,
}

/// Compute `expectedServices` from `mode` (spec §9: "always include `video`
/// when mode=video, always include `game` when mode=random, never both").
fn expected_services(mode: Mode) -> Vec<Service> {
    match mode {
        Mode::Random => vec![Service::Game],
        Mode::Video => vec![Service::Video],
    }
}

/// A handshake in progress (spec §3, "PendingRoom").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRoom {
    /// Unique room id (monotonic timestamp + random tail).
    pub room_id: String,
    /// First party (role `A`, initiator).
    pub player_a: RoomParty,
    /// Second party (role `B`).
    pub player_b: RoomParty,
    /// Services that must all report ready before finalization.
    pub expected_services: Vec<Service>,
    /// Which of `expected_services` have reported ready.
    pub ready: Vec<Service>,
    /// Epoch ms the room was created.
    pub created_at: i64,
}

impl PendingRoom {
    fn is_ready(&self) -> bool {
        self.expected_services
            .iter()
            .all(|s| self.ready.contains(s))
    }

    fn mark_ready(&mut self, service: Service) {
        if !self.ready.contains(&service) {
            self.ready.push(service);
        }
    }
}

/// One half of an established pairing (spec §3, "ActiveSession").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEntry {
    /// Shared room id.
    pub room_id: String,
    /// The other participant's uid.
    pub opponent_uid: String,
    /// This entry's role in the original pairing.
    pub role: Role,
    /// Epoch ms the session was finalized.
    pub start_time: i64,
}

/// Which side of a pairing a party played (`A` is the initiator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Initiating side.
    A,
    /// Responding side.
    B,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::A => "A",
            Role::B => "B",
        }
    }
}

fn room_key(room_id: &str) -> String {
    format!("room:{room_id}")
}

fn session_key(uid: &str) -> String {
    format!("session:{uid}")
}

/// Supplementary index (not itself named in spec §6's keyspace table) of
/// live room ids scored by `createdAt`, letting the stale-room reaper and
/// `handleReconnection`'s pending-room scan enumerate rooms without a full
/// keyspace scan.
const PENDING_ROOMS_INDEX: &str = "rooms:pending:index";

/// PendingRoom + ActiveSession tables and the transitions between them
/// (spec §4.6).
pub struct SessionRegistry {
    store: SharedStore,
    sockets: std::sync::Arc<SocketRegistry>,
    ice: IceMinter,
    analytics: std::sync::Arc<dyn AnalyticsSink>,
    emitter: std::sync::Arc<dyn Emitter>,
    room_ttl: Duration,
}

impl SessionRegistry {
    /// Build a Session Registry over its collaborators.
    pub fn new(
        store: SharedStore,
        sockets: std::sync::Arc<SocketRegistry>,
        ice: IceMinter,
        analytics: std::sync::Arc<dyn AnalyticsSink>,
        emitter: std::sync::Arc<dyn Emitter>,
        room_ttl: Duration,
    ) -> Self {
        Self {
            store,
            sockets,
            ice,
            analytics,
            emitter,
            room_ttl,
        }
    }

    async fn load_room(&self, room_id: &str) -> Result<Option<PendingRoom>, SessionRegistryError> {
        let Some(raw) = self.store.get_str(&room_key(room_id)).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| SessionRegistryError::Corrupt(e.to_string()))
    }

    async fn save_room(&self, room: &PendingRoom) -> Result<(), SessionRegistryError> {
        let raw =
            serde_json::to_string(room).map_err(|e| SessionRegistryError::Corrupt(e.to_string()))?;
        self.store
            .set_str(&room_key(&room.room_id), &raw, Some(self.room_ttl))
            .await?;
        Ok(())
    }

    async fn delete_room(&self, room_id: &str) -> Result<(), SessionRegistryError> {
        self.store.del(&room_key(room_id)).await?;
        self.store.zrem(PENDING_ROOMS_INDEX, room_id).await?;
        Ok(())
    }

    async fn load_session(&self, uid: &str) -> Result<Option<SessionEntry>, SessionRegistryError> {
        let Some(raw) = self.store.get_str(&session_key(uid)).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| SessionRegistryError::Corrupt(e.to_string()))
    }

    async fn save_session(&self, uid: &str, entry: &SessionEntry) -> Result<(), SessionRegistryError> {
        let raw =
            serde_json::to_string(entry).map_err(|e| SessionRegistryError::Corrupt(e.to_string()))?;
        self.store.set_str(&session_key(uid), &raw, None).await?;
        Ok(())
    }

    async fn delete_session(&self, uid: &str) -> Result<(), SessionRegistryError> {
        self.store.del(&session_key(uid)).await?;
        Ok(())
    }

    /// Build a fresh room id: monotonic millis plus a random tail, per spec
    /// §3.
    fn new_room_id(now_ms: i64) -> String {
        let tail = uuid::Uuid::new_v4().simple().to_string();
        format!("room-{now_ms}-{}", &tail[..8])
    }

    /// Expose the current opponent uid for `uid`, if an `ActiveSession`
    /// exists (used by the Signal Router's fallback routing step, spec
    /// §4.7 step 3).
    pub async fn opponent_uid_for(&self, uid: &str) -> Result<Option<String>, SessionRegistryError> {
        Ok(self.load_session(uid).await?.map(|e| e.opponent_uid))
    }

    #[cfg(test)]
    pub(crate) async fn save_session_for_test(
        &self,
        uid: &str,
        entry: SessionEntry,
    ) -> Result<(), SessionRegistryError> {
        self.save_session(uid, &entry).await
    }

    /// `executeMatch(A, B, mode)` (spec §4.6 step-by-step).
    pub async fn execute_match(
        &self,
        a: &QueueUser,
        b: &QueueUser,
        now_ms: i64,
    ) -> Result<(), SessionRegistryError> {
        let socket_a = self.sockets.lookup(&a.uid).await.map_err(|e| {
            SessionRegistryError::Store(format!("socket registry lookup failed: {e}"))
        })?;
        let socket_b = self.sockets.lookup(&b.uid).await.map_err(|e| {
            SessionRegistryError::Store(format!("socket registry lookup failed: {e}"))
        })?;

        // Abort silently if either side is no longer connected (spec §4.6
        // step 1); both uids were already removed from the queue by the
        // Match Engine before this call, matching the documented "current
        // behavior" of not re-enqueuing the survivor (spec §9).
        let (Some(socket_a), Some(socket_b)) = (socket_a, socket_b) else {
            return Ok(());
        };

        let room = PendingRoom {
            room_id: Self::new_room_id(now_ms),
            player_a: RoomParty {
                uid: a.uid.clone(),
                socket_id: socket_a.clone(),
            },
            player_b: RoomParty {
                uid: b.uid.clone(),
                socket_id: socket_b.clone(),
            },
            expected_services: expected_services(a.mode),
            ready: Vec::new(),
            created_at: now_ms,
        };
        self.save_room(&room).await?;
        self.store
            .zadd(PENDING_ROOMS_INDEX, now_ms as f64, &room.room_id)
            .await?;

        let ice_a = self.ice.mint(&a.uid, now_ms / 1000);
        let ice_b = self.ice.mint(&b.uid, now_ms / 1000);

        self.emitter.emit(
            &socket_a,
            match_found_message(&room.room_id, Role::A, &socket_b, &b.uid, ice_a, None),
        );
        self.emitter.emit(
            &socket_b,
            match_found_message(&room.room_id, Role::B, &socket_a, &a.uid, ice_b, None),
        );

        Ok(())
    }

    /// `handleConnectionStable(socket, roomId, service)` (spec §4.6).
    pub async fn handle_connection_stable(
        &self,
        room_id: &str,
        service: Service,
        now_ms: i64,
    ) -> Result<(), SessionRegistryError> {
        let Some(mut room) = self.load_room(room_id).await? else {
            return Ok(());
        };
        room.mark_ready(service);

        if !room.is_ready() {
            self.save_room(&room).await?;
            return Ok(());
        }

        let entry_a = SessionEntry {
            room_id: room.room_id.clone(),
            opponent_uid: room.player_b.uid.clone(),
            role: Role::A,
            start_time: now_ms,
        };
        let entry_b = SessionEntry {
            room_id: room.room_id.clone(),
            opponent_uid: room.player_a.uid.clone(),
            role: Role::B,
            start_time: now_ms,
        };
        self.save_session(&room.player_a.uid, &entry_a).await?;
        self.save_session(&room.player_b.uid, &entry_b).await?;

        self.emitter.emit(
            &room.player_a.socket_id,
            ServerMessage::SessionEstablished {
                room_id: room.room_id.clone(),
            },
        );
        self.emitter.emit(
            &room.player_b.socket_id,
            ServerMessage::SessionEstablished {
                room_id: room.room_id.clone(),
            },
        );

        self.delete_room(&room.room_id).await?;
        self.analytics.record(AnalyticsEvent::MatchStart {
            room_id: room.room_id,
            uid_a: room.player_a.uid,
            uid_b: room.player_b.uid,
        });

        Ok(())
    }

    /// `handleReconnection(socket, uid)` (spec §4.6).
    pub async fn handle_reconnection(
        &self,
        uid: &str,
        new_socket_id: &str,
        now_ms: i64,
    ) -> Result<(), SessionRegistryError> {
        if let Some(entry) = self.load_session(uid).await? {
            let opponent_socket = self.sockets.lookup(&entry.opponent_uid).await.map_err(|e| {
                SessionRegistryError::Store(format!("socket registry lookup failed: {e}"))
            })?;

            if let Some(opponent_socket) = opponent_socket {
                let ice = self.ice.mint(uid, now_ms / 1000);
                self.emitter.emit(
                    new_socket_id,
                    match_found_message(
                        &entry.room_id,
                        entry.role,
                        &opponent_socket,
                        &entry.opponent_uid,
                        ice,
                        Some(true),
                    ),
                );
                self.emitter.emit(
                    &opponent_socket,
                    ServerMessage::OpponentReconnected {
                        opponent_socket_id: new_socket_id.to_string(),
                    },
                );
            }
            return Ok(());
        }

        // Not an established session; check for a pending handshake.
        // Rooms are few and short-lived so a linear scan is acceptable;
        // production deployments would index by uid if this grows hot.
        if let Some(mut room) = self.find_pending_room_for_uid(uid).await? {
            let (other_socket, self_is_a) = if room.player_a.uid == uid {
                room.player_a.socket_id = new_socket_id.to_string();
                (room.player_b.socket_id.clone(), true)
            } else {
                room.player_b.socket_id = new_socket_id.to_string();
                (room.player_a.socket_id.clone(), false)
            };
            let role = if self_is_a { Role::A } else { Role::B };
            let opponent_uid = if self_is_a {
                room.player_b.uid.clone()
            } else {
                room.player_a.uid.clone()
            };
            let ice = self.ice.mint(uid, now_ms / 1000);
            self.emitter.emit(
                new_socket_id,
                match_found_message(&room.room_id, role, &other_socket, &opponent_uid, ice, None),
            );
            self.save_room(&room).await?;
        }

        Ok(())
    }

    async fn find_pending_room_for_uid(
        &self,
        uid: &str,
    ) -> Result<Option<PendingRoom>, SessionRegistryError> {
        let indexed = self.store.zrange_oldest(PENDING_ROOMS_INDEX, 10_000).await?;
        for entry in indexed {
            if let Some(room) = self.load_room(&entry.member).await? {
                if room.player_a.uid == uid || room.player_b.uid == uid {
                    return Ok(Some(room));
                }
            }
        }
        Ok(None)
    }

    /// Reap any `PendingRoom` whose handshake has exceeded `timeout` (spec
    /// §5: "A PendingRoom is reaped 30 s after `createdAt` with a
    /// `match_error` to both sides"). Returns the reaped room ids.
    pub async fn reap_stale_rooms(
        &self,
        now_ms: i64,
        timeout: Duration,
    ) -> Result<Vec<String>, SessionRegistryError> {
        let indexed = self.store.zrange_oldest(PENDING_ROOMS_INDEX, 10_000).await?;
        let mut reaped = Vec::new();
        for entry in indexed {
            let Some(room) = self.load_room(&entry.member).await? else {
                self.store.zrem(PENDING_ROOMS_INDEX, &entry.member).await?;
                continue;
            };
            if now_ms - room.created_at < timeout.as_millis() as i64 {
                break; // index is oldest-first; nothing older remains stale either
            }
            self.emitter.emit(
                &room.player_a.socket_id,
                ServerMessage::MatchError {
                    message: "handshake timed out".to_string(),
                },
            );
            self.emitter.emit(
                &room.player_b.socket_id,
                ServerMessage::MatchError {
                    message: "handshake timed out".to_string(),
                },
            );
            self.delete_room(&room.room_id).await?;
            reaped.push(room.room_id);
        }
        Ok(reaped)
    }

    /// `handleSkipMatch(socketId)` and `handleDisconnect(socketId)` share
    /// this teardown (spec §4.6): both clear any `ActiveSession`, notify
    /// both parties, and (disconnect only) update the Socket Registry.
    async fn teardown_active_session(
        &self,
        uid: &str,
        reason: &str,
    ) -> Result<(), SessionRegistryError> {
        let Some(entry) = self.load_session(uid).await? else {
            return Ok(());
        };
        self.delete_session(uid).await?;
        self.delete_session(&entry.opponent_uid).await?;

        for party_uid in [uid, entry.opponent_uid.as_str()] {
            if let Some(socket_id) = self.sockets.lookup(party_uid).await.map_err(|e| {
                SessionRegistryError::Store(format!("socket registry lookup failed: {e}"))
            })? {
                self.emitter.emit(&socket_id, ServerMessage::MatchSkipped);
            }
        }

        self.analytics.record(AnalyticsEvent::MatchEnd {
            room_id: entry.room_id,
            uid_a: uid.to_string(),
            uid_b: entry.opponent_uid,
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// `handleSkipMatch(socketId)` (spec §4.6).
    pub async fn handle_skip_match(&self, uid: &str) -> Result<(), SessionRegistryError> {
        self.teardown_active_session(uid, "skip").await
    }

    /// `handleDisconnect(socketId)` (spec §4.6). Socket Registry cleanup is
    /// the caller's responsibility (it happens once per connection close,
    /// ahead of this teardown, via [`SocketRegistry::unregister`]).
    pub async fn handle_disconnect(&self, uid: &str) -> Result<(), SessionRegistryError> {
        self.teardown_active_session(uid, "disconnect").await
    }
}

fn match_found_message(
    room_id: &str,
    role: Role,
    opponent_socket: &str,
    opponent_uid: &str,
    ice_servers: IceServers,
    is_reconnection: Option<bool>,
) -> ServerMessage {
    ServerMessage::MatchFound {
        room_id: room_id.to_string(),
        role: role.as_str().to_string(),
        opponent_id: opponent_socket.to_string(),
        opponent_uid: opponent_uid.to_string(),
        is_initiator: role == Role::A,
        ice_servers,
        is_reconnection,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{Gender, Preferences, Tier};
    use crate::store::LocalStore;
    use std::sync::{Arc, Mutex};

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

    fn user(uid: &str, gender: Gender, mode: Mode) -> QueueUser {
        QueueUser {
            uid: uid.to_string(),
            socket_id: format!("sock-{uid}"),
            gender,
            location: None,
            tier: Tier::Free,
            mode,
            preferences: Preferences::default(),
            joined_at: 0,
            widen_stage: 0,
            bot_mode_active: false,
        }
    }

    async fn registry() -> (
        SessionRegistry,
        Arc<SocketRegistry>,
        Arc<RecordingEmitter>,
    ) {
        let store: SharedStore = Arc::new(LocalStore::new());
        let sockets = Arc::new(SocketRegistry::new(store.clone(), Duration::from_secs(86_400)));
        let emitter = Arc::new(RecordingEmitter::default());
        let registry = SessionRegistry::new(
            store,
            sockets.clone(),
            IceMinter::new(None, None),
            Arc::new(crate::analytics::TracingAnalyticsSink),
            emitter.clone(),
            Duration::from_secs(300),
        );
        (registry, sockets, emitter)
    }

    #[tokio::test]
    async fn execute_match_emits_reciprocal_match_found() {
        let (registry, sockets, emitter) = registry().await;
        sockets.register("sock-alice", "alice").await.unwrap();
        sockets.register("sock-bob", "bob").await.unwrap();

        let alice = user("alice", Gender::Female, Mode::Random);
        let bob = user("bob", Gender::Male, Mode::Random);
        registry.execute_match(&alice, &bob, 1_000).await.unwrap();

        let sent = emitter.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        match &sent[0].1 {
            ServerMessage::MatchFound { opponent_uid, is_initiator, .. } => {
                assert_eq!(opponent_uid, "bob");
                assert!(*is_initiator);
            }
            _ => panic!("wrong message"),
        }
    }

    #[tokio::test]
    async fn execute_match_aborts_silently_if_peer_offline() {
        let (registry, sockets, emitter) = registry().await;
        sockets.register("sock-alice", "alice").await.unwrap();
        // bob never registers a socket.

        let alice = user("alice", Gender::Female, Mode::Random);
        let bob = user("bob", Gender::Male, Mode::Random);
        registry.execute_match(&alice, &bob, 1_000).await.unwrap();

        assert!(emitter.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn finalization_requires_all_expected_services() {
        let (registry, sockets, emitter) = registry().await;
        sockets.register("sock-hank", "hank").await.unwrap();
        sockets.register("sock-ivy", "ivy").await.unwrap();

        let hank = user("hank", Gender::Male, Mode::Video);
        let ivy = user("ivy", Gender::Female, Mode::Video);
        registry.execute_match(&hank, &ivy, 1_000).await.unwrap();

        let room_id = {
            let sent = emitter.sent.lock().unwrap();
            match &sent[0].1 {
                ServerMessage::MatchFound { room_id, .. } => room_id.clone(),
                _ => panic!("wrong message"),
            }
        };

        registry
            .handle_connection_stable(&room_id, Service::Video, 2_000)
            .await
            .unwrap();

        let established = emitter
            .sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, m)| matches!(m, ServerMessage::SessionEstablished { .. }))
            .count();
        assert_eq!(established, 2);
    }

    #[tokio::test]
    async fn skip_match_tears_down_both_sides() {
        let (registry, sockets, emitter) = registry().await;
        sockets.register("sock-jack", "jack").await.unwrap();
        sockets.register("sock-kate", "kate").await.unwrap();

        registry
            .save_session(
                "jack",
                &SessionEntry {
                    room_id: "r1".to_string(),
                    opponent_uid: "kate".to_string(),
                    role: Role::A,
                    start_time: 0,
                },
            )
            .await
            .unwrap();
        registry
            .save_session(
                "kate",
                &SessionEntry {
                    room_id: "r1".to_string(),
                    opponent_uid: "jack".to_string(),
                    role: Role::B,
                    start_time: 0,
                },
            )
            .await
            .unwrap();

        registry.handle_skip_match("jack").await.unwrap();

        assert!(registry.load_session("jack").await.unwrap().is_none());
        assert!(registry.load_session("kate").await.unwrap().is_none());
        let skipped = emitter
            .sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, m)| matches!(m, ServerMessage::MatchSkipped))
            .count();
        assert_eq!(skipped, 2);
    }
}
