//! HTTP + WebSocket transport and per-connection dispatch (spec §5, §6).
//!
//! Router shape (one `GET /health` route plus a WebSocket upgrade route on
//! one shared port) is grounded on `chad-freeq`'s `web.rs` bridge pattern
//! (`axum::extract::ws::WebSocketUpgrade` driving a duplex channel); the
//! per-connection task and dispatcher structure otherwise mirrors the
//! teacher's `handle_connection` / `handle_client_message` in
//! `network/server.rs`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::admin::AdminFacade;
use crate::analytics::AnalyticsSink;
use crate::auth::authenticate;
use crate::ban::BanGate;
use crate::ice::IceMinter;
use crate::invite::InviteRelay;
use crate::profile::{ProfileProvider, UnconfiguredProfileProvider};
use crate::protocol::{AuthPayload, ClientMessage, IceServers, ServerMessage, SignalFrame};
use crate::queue::{Preferences, QueueStore, QueueUser};
use crate::session::{Emitter, Service, SessionRegistry};
use crate::signal_router::{resolve_target, SignalKind};
use crate::socket_registry::SocketRegistry;
use crate::store::SharedStore;
use crate::tick_leader::TickLeader;
use crate::Config;

/// Errors surfaced while standing up the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The bind address could not be used.
    #[error("bind failed: {0}")]
    Bind(#[from] std::io::Error),

    /// The backing store could not be constructed.
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),
}

/// Broadcast sink keyed by socket id, backing the [`Emitter`] trait used
/// throughout the domain layer. Mirrors the teacher's per-client `sender`
/// field in `ConnectedClient` (`network/server.rs`), generalized to a
/// shared table so any component can address any live connection.
#[derive(Clone)]
pub struct ConnectionTable {
    senders: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<WsMessage>>>>,
}

impl ConnectionTable {
    fn new() -> Self {
        Self {
            senders: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn insert(&self, socket_id: &str, sender: mpsc::UnboundedSender<WsMessage>) {
        self.senders.lock().await.insert(socket_id.to_string(), sender);
    }

    async fn remove(&self, socket_id: &str) {
        self.senders.lock().await.remove(socket_id);
    }
}

impl Emitter for ConnectionTable {
    fn emit(&self, socket_id: &str, message: ServerMessage) {
        let Ok(json) = message.to_json() else {
            return;
        };
        let senders = self.senders.clone();
        let socket_id = socket_id.to_string();
        tokio::spawn(async move {
            if let Some(sender) = senders.lock().await.get(&socket_id) {
                let _ = sender.send(WsMessage::Text(json));
            }
        });
    }
}

/// All live components the connection handlers and background tasks share.
pub struct AppState {
    config: Config,
    store: SharedStore,
    sockets: Arc<SocketRegistry>,
    bans: Arc<BanGate>,
    queue: Arc<QueueStore>,
    sessions: Arc<SessionRegistry>,
    ice: Arc<IceMinter>,
    connections: ConnectionTable,
    analytics: Arc<dyn AnalyticsSink>,
    profile: Arc<dyn ProfileProvider>,
}

impl AppState {
    /// Assemble the full component graph from configuration.
    pub async fn build(config: Config) -> Result<Arc<Self>, ServerError> {
        let store = crate::store::build_store(config.redis_url.as_deref()).await?;
        let sockets = Arc::new(SocketRegistry::new(store.clone(), config.socket_binding_ttl));
        let bans = Arc::new(BanGate::new(store.clone()));
        let queue = Arc::new(QueueStore::new(store.clone()));
        let connections = ConnectionTable::new();
        let analytics: Arc<dyn AnalyticsSink> = Arc::new(crate::analytics::TracingAnalyticsSink);
        let ice = Arc::new(IceMinter::new(config.game_turn.clone(), config.video_turn.clone()));
        let profile: Arc<dyn ProfileProvider> = Arc::new(UnconfiguredProfileProvider);

        let sessions = Arc::new(SessionRegistry::new(
            store.clone(),
            sockets.clone(),
            (*ice).clone(),
            analytics.clone(),
            Arc::new(connections.clone()),
            config.room_persist_ttl,
        ));

        Ok(Arc::new(Self {
            config,
            store,
            sockets,
            bans,
            queue,
            sessions,
            ice,
            connections,
            analytics,
            profile,
        }))
    }

    /// Swap in a real profile backend (tests, or a deployment that wires one
    /// up before calling [`build_router`]).
    pub fn with_profile_provider(mut self: Arc<Self>, provider: Arc<dyn ProfileProvider>) -> Arc<Self> {
        Arc::get_mut(&mut self)
            .expect("with_profile_provider must run before the state is shared")
            .profile = provider;
        self
    }
}

/// Build the axum router: `GET /health` plus the WebSocket upgrade under
/// the configured path prefix (spec §6's HTTP surface).
pub fn build_router(state: Arc<AppState>) -> Router {
    let ws_path = state.config.socket_io_path.clone();
    Router::new()
        .route("/health", get(health))
        .route(&ws_path, get(upgrade_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    axum::Json(serde_json::json!({"status": "ok", "service": "matchmaking"}))
}

async fn upgrade_handler(
    State(state): State<Arc<AppState>>,
    axum::extract::Query(auth): axum::extract::Query<AuthPayload>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, auth))
}

/// Spawn the per-connection task: authenticate once from the upgrade
/// request's query-string `auth` fields (the handshake carries
/// `{ auth: {...} }}`, spec §6; this transport accepts it as
/// `?token=...&userId=...&serverKey=...` since an axum WebSocket upgrade
/// has no separate pre-stream handshake frame), then a write-back channel
/// plus an inbound frame loop (spec §5: "each client's inbound event
/// handling is logically serial per connection").
#[instrument(skip(socket, state, auth))]
async fn handle_connection(socket: WebSocket, state: Arc<AppState>, auth: AuthPayload) {
    let socket_id = uuid::Uuid::new_v4().to_string();
    let (mut ws_sink, mut ws_stream) = socket.split();

    let identity = match authenticate(&auth, state.config.jwt_secret.as_deref(), state.config.admin_server_key.as_deref()) {
        Ok(identity) => identity,
        Err(e) => {
            warn!(error = %e, "handshake rejected");
            let _ = ws_sink
                .send(WsMessage::Text(
                    ServerMessage::Error { message: e.to_string() }.to_json().unwrap_or_default(),
                ))
                .await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    state.connections.insert(&socket_id, tx).await;
    state.sockets.register(&socket_id, &identity.uid).await.ok();

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_stream.next().await {
        let WsMessage::Text(text) = msg else {
            continue;
        };
        let Ok(client_msg) = ClientMessage::from_json(&text) else {
            continue;
        };
        if matches!(client_msg, ClientMessage::AdminKickUser { .. }
            | ClientMessage::AdminBanUser { .. }
            | ClientMessage::AdminUnbanUser { .. }
            | ClientMessage::AdminForceDisconnect { .. })
            && !identity.is_admin
        {
            state.connections.emit(
                &socket_id,
                ServerMessage::Error { message: "admin privileges required".to_string() },
            );
            continue;
        }
        dispatch(&state, &socket_id, &identity.uid, client_msg).await;
    }

    writer.abort();
    state.connections.remove(&socket_id).await;
    state.sockets.unregister(&socket_id).await.ok();
    state.sessions.handle_disconnect(&identity.uid).await.ok();
    state.queue.remove_by_uid(&identity.uid).await.ok();
}

async fn dispatch(state: &Arc<AppState>, socket_id: &str, uid: &str, msg: ClientMessage) {
    let now_ms = now_ms();
    match msg {
        ClientMessage::JoinQueue { mode, preferences } => {
            if let Err(reason) = admit_to_queue(state, socket_id, uid, mode, preferences, now_ms).await
            {
                state.connections.emit(socket_id, ServerMessage::Error { message: reason });
            }
        }
        ClientMessage::LeaveQueue => {
            state.queue.remove_by_uid(uid).await.ok();
        }
        ClientMessage::SkipMatch => {
            state.sessions.handle_skip_match(uid).await.ok();
        }
        ClientMessage::ConnectionStable { room_id, service } => {
            let service = match service.as_str() {
                "game" => Some(Service::Game),
                "video" => Some(Service::Video),
                _ => None,
            };
            if let Some(service) = service {
                state
                    .sessions
                    .handle_connection_stable(&room_id, service, now_ms)
                    .await
                    .ok();
            }
        }
        ClientMessage::Reconnect => {
            state.sessions.handle_reconnection(uid, socket_id, now_ms).await.ok();
        }
        ClientMessage::GetIceServers => {
            let servers: IceServers = state.ice.mint(uid, now_ms / 1000);
            state
                .connections
                .emit(socket_id, ServerMessage::IceServersConfig { ice_servers: servers });
        }
        ClientMessage::Offer(frame) => relay(state, socket_id, uid, SignalKind::Offer, frame).await,
        ClientMessage::Answer(frame) => relay(state, socket_id, uid, SignalKind::Answer, frame).await,
        ClientMessage::IceCandidate(frame) => {
            relay(state, socket_id, uid, SignalKind::IceCandidate, frame).await
        }
        ClientMessage::VideoOffer(frame) => {
            relay(state, socket_id, uid, SignalKind::VideoOffer, frame).await
        }
        ClientMessage::VideoAnswer(frame) => {
            relay(state, socket_id, uid, SignalKind::VideoAnswer, frame).await
        }
        ClientMessage::VideoIceCandidate(frame) => {
            relay(state, socket_id, uid, SignalKind::VideoIceCandidate, frame).await
        }
        ClientMessage::SendInvite { target_uid } => {
            let relay = InviteRelay::new(&state.sockets, &state.connections);
            relay.send_invite(socket_id, uid, &target_uid).await.ok();
        }
        ClientMessage::AcceptInvite { inviter_uid } => {
            let relay = InviteRelay::new(&state.sockets, &state.connections);
            relay.accept_invite(socket_id, &inviter_uid).await.ok();
        }
        ClientMessage::RejectInvite { inviter_uid } => {
            let relay = InviteRelay::new(&state.sockets, &state.connections);
            relay.reject_invite(uid, &inviter_uid).await.ok();
        }
        ClientMessage::AdminKickUser { uid: target, reason } => {
            run_admin(state, |facade| {
                let reason = reason.clone();
                let target = target.clone();
                Box::pin(async move { facade.kick_user(&target, reason.as_deref()).await })
            })
            .await;
        }
        ClientMessage::AdminBanUser { uid: target, reason, duration_minutes } => {
            run_admin(state, move |facade| {
                let reason = reason.clone();
                let target = target.clone();
                Box::pin(async move {
                    facade.ban_user(&target, &reason, duration_minutes, now_ms).await
                })
            })
            .await;
        }
        ClientMessage::AdminUnbanUser { uid: target } => {
            run_admin(state, move |facade| {
                let target = target.clone();
                Box::pin(async move { facade.unban_user(&target).await })
            })
            .await;
        }
        ClientMessage::AdminForceDisconnect { uid: target } => {
            run_admin(state, move |facade| {
                let target = target.clone();
                Box::pin(async move { facade.force_disconnect(&target, "disconnected by an administrator").await })
            })
            .await;
        }
    }
}

async fn run_admin<'a, F>(state: &'a Arc<AppState>, build: F)
where
    F: for<'f> FnOnce(
        &'f AdminFacade<'f>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), crate::admin::AdminError>> + Send + 'f>>,
{
    let facade = AdminFacade::new(&state.bans, &state.sockets, &state.sessions, &state.connections);
    if let Err(e) = build(&facade).await {
        warn!(error = %e, "admin operation failed");
    }
}

async fn admit_to_queue(
    state: &Arc<AppState>,
    socket_id: &str,
    uid: &str,
    mode: crate::queue::Mode,
    preferences: crate::protocol::PreferenceRequest,
    now_ms: i64,
) -> Result<(), String> {
    let now_banned = state
        .bans
        .is_banned(uid, now_ms)
        .await
        .map_err(|e| e.to_string())?;
    if let Some(entry) = now_banned {
        let remaining = state.bans.remaining_ban_time(uid, now_ms).await.map_err(|e| e.to_string())?;
        state.connections.emit(
            socket_id,
            ServerMessage::Banned {
                reason: entry.reason,
                remaining_minutes: if remaining > 0 { remaining / 60_000 } else { remaining },
                message: "you are currently banned".to_string(),
            },
        );
        return Ok(());
    }

    // Gender/tier/location are owned by the out-of-scope profile provider
    // (spec §1); admission fails closed rather than guessing when none is
    // configured (spec §7: `ProfileMissing`).
    let profile = state
        .profile
        .lookup(uid)
        .await
        .ok_or_else(|| crate::AppError::ProfileMissing(uid.to_string()).to_string())?;

    let filtered: Preferences = profile.tier.filter(Preferences {
        gender: preferences.gender,
        location: preferences.location,
    });

    let user = QueueUser {
        uid: uid.to_string(),
        socket_id: socket_id.to_string(),
        gender: profile.gender,
        location: profile.location,
        tier: profile.tier,
        mode,
        preferences: filtered,
        joined_at: now_ms,
        widen_stage: 0,
        bot_mode_active: false,
    };
    state.queue.join_queue(user).await.map_err(|e| e.to_string())
}

async fn relay(state: &Arc<AppState>, socket_id: &str, uid: &str, kind: SignalKind, frame: SignalFrame) {
    let target = match resolve_target(&state.sockets, &state.sessions, uid, &frame).await {
        Ok(target) => target,
        Err(e) => {
            warn!(error = %e, "signal routing lookup failed");
            return;
        }
    };
    let Some(target_socket) = target else {
        return;
    };
    state.connections.emit(
        &target_socket,
        ServerMessage::Signal {
            kind: kind.as_str().to_string(),
            payload: frame.payload,
            from: socket_id.to_string(),
            from_uid: Some(uid.to_string()),
        },
    );
}

/// Spawn the tick-leader loop and the stale-room reaper (spec §5).
pub fn spawn_background_tasks(state: Arc<AppState>) {
    let tick_state = state.clone();
    tokio::spawn(async move {
        let leader = TickLeader::new(
            tick_state.store.clone(),
            tick_state.config.lease_ttl,
            uuid::Uuid::new_v4().to_string(),
        );
        let engine = crate::match_engine::MatchEngine::new(
            tick_state.queue.clone(),
            tick_state.sessions.clone(),
            tick_state.config.match_batch_size,
        );
        leader
            .run(tick_state.config.tick_interval, || {
                let engine = &engine;
                let tick_state = &tick_state;
                async move {
                    let now = now_ms();
                    match engine.run_cycle(now).await {
                        Ok(outcome) => {
                            for uid in outcome.bot_mode_notices {
                                if let Ok(Some(socket_id)) = tick_state.sockets.lookup(&uid).await {
                                    tick_state.connections.emit(
                                        &socket_id,
                                        ServerMessage::StartBotMode {
                                            reason: "timeout_waiting".to_string(),
                                        },
                                    );
                                }
                            }
                        }
                        Err(e) => warn!(error = %e, "matching cycle failed"),
                    }
                }
            })
            .await;
    });

    let reaper_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            let now = now_ms();
            match reaper_state
                .sessions
                .reap_stale_rooms(now, reaper_state.config.pending_room_ttl)
                .await
            {
                Ok(reaped) if !reaped.is_empty() => {
                    info!(count = reaped.len(), "reaped stale pending rooms");
                }
                Err(e) => warn!(error = %e, "stale room reap failed"),
                _ => {}
            }
        }
    });
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
