//! Crate-wide error type.
//!
//! Individual components (ban gate, session registry, ...) define their own
//! narrow `thiserror` enums; this type exists only at handler boundaries
//! that must flatten several component error sources into one outbound
//! event, mirroring the teacher's `GameServerError` in `network/server.rs`.

use thiserror::Error;

use crate::ban::BanGateError;
use crate::queue::QueueError;
use crate::session::SessionRegistryError;
use crate::socket_registry::SocketRegistryError;
use crate::store::StoreError;

/// Top-level error type for connection-handling boundaries.
#[derive(Debug, Error)]
pub enum AppError {
    /// Backing store failure (Redis transport error, serialization error).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Socket registry failure.
    #[error("socket registry error: {0}")]
    SocketRegistry(#[from] SocketRegistryError),

    /// Ban gate failure.
    #[error("ban gate error: {0}")]
    BanGate(#[from] BanGateError),

    /// Session registry failure.
    #[error("session error: {0}")]
    Session(#[from] SessionRegistryError),

    /// Queue store failure.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// No credential supplied on the handshake.
    #[error("authentication missing")]
    AuthMissing,

    /// Credential supplied but rejected.
    #[error("authentication invalid: {0}")]
    AuthInvalid(String),

    /// Authenticated user lacks required profile fields.
    #[error("profile missing required field: {0}")]
    ProfileMissing(String),

    /// Target uid has no current socket binding.
    #[error("peer offline: {0}")]
    PeerOffline(String),

    /// Operation attempted by a non-admin connection.
    #[error("admin privileges required")]
    NotAdmin,
}
