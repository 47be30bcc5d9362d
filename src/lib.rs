//! # Matchmaking & WebRTC-Signaling Broker
//!
//! Realtime matchmaking and signaling broker for a two-player interactive
//! product (a game plus optional peer-to-peer video chat). Clients connect
//! over a persistent duplex channel, are authenticated, placed into a
//! partitioned waiting queue with soft-preference filters, paired by a
//! server tick into a signaling room, and then relayed peer-to-peer
//! offer/answer/ICE traffic until one side skips or disconnects.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      MATCHMAKING BROKER                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  store/             - typed keyspace accessor (Redis / local)  │
//! │  socket_registry.rs - socket-id <-> uid bindings                │
//! │  ban.rs             - expiring ban gate                        │
//! │  queue.rs           - partitioned waiting queue                │
//! │  match_engine.rs    - periodic pairing cycle                   │
//! │  tick_leader.rs     - cross-replica lease for the tick         │
//! │  session.rs         - pending room / active session registry   │
//! │  signal_router.rs   - offer/answer/ICE frame routing            │
//! │  ice.rs             - TURN credential minting                  │
//! │  admin.rs           - admin-only operations façade             │
//! │  invite.rs          - stateless invite relay                   │
//! │  analytics.rs       - one-way analytics sink                   │
//! │  auth.rs            - handshake authentication                 │
//! │  profile.rs          - external profile-provider seam           │
//! │  protocol.rs        - wire message types                       │
//! │  server.rs          - axum transport + connection dispatch     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The broker never parses SDP/ICE payloads; it only routes opaque frames
//! between the two peers of a session (see [`signal_router`]).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod admin;
pub mod analytics;
pub mod auth;
pub mod ban;
pub mod config;
pub mod error;
pub mod ice;
pub mod invite;
pub mod match_engine;
pub mod profile;
pub mod protocol;
pub mod queue;
pub mod server;
pub mod session;
pub mod signal_router;
pub mod socket_registry;
pub mod store;
pub mod tick_leader;

pub use config::Config;
pub use error::AppError;

/// Crate version, surfaced to clients in `auth_result`-equivalent payloads.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Nominal matching-cycle period (spec: "every ~2 s").
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 2_000;

/// Nominal tick-leader lease TTL (spec: "short-TTL lease").
pub const DEFAULT_LEASE_TTL_MS: u64 = 3_000;

/// Nominal per-partition hydration batch size for one matching cycle.
pub const DEFAULT_MATCH_BATCH_SIZE: usize = 100;

/// Handshake timeout for a `PendingRoom` (spec: "30 s handshake timeout").
pub const PENDING_ROOM_TTL_SECS: u64 = 30;

/// Storage TTL for a persisted `PendingRoom` record (crash safety).
pub const ROOM_PERSIST_TTL_SECS: u64 = 300;

/// Storage TTL for socket<->uid bindings.
pub const SOCKET_BINDING_TTL_SECS: u64 = 86_400;

/// Wait time after which a waiter is widened past location filtering.
pub const WIDEN_STAGE_1_MS: i64 = 5_000;

/// Wait time after which a waiter is widened past gender filtering
/// (unless tier is DIAMOND).
pub const WIDEN_STAGE_2_MS: i64 = 10_000;

/// Wait time after which a waiter is offered bot-mode fallback.
pub const BOT_MODE_THRESHOLD_MS: i64 = 30_000;

/// ICE/TURN credential validity window.
pub const ICE_CREDENTIAL_TTL_SECS: u64 = 24 * 60 * 60;
