//! Environment-driven configuration.
//!
//! Mirrors the teacher's `network::auth::AuthConfig::from_env` pattern,
//! extended to the full variable table the broker recognizes (see
//! `SPEC_FULL.md` §6).

use std::time::Duration;

/// TURN endpoint configuration: a URL plus the shared secret used to mint
/// time-limited credentials (spec §4.8).
#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// TURN server URL, e.g. `turn:turn.example.com:3478`.
    pub url: String,
    /// Shared secret used as the HMAC-SHA1 key.
    pub secret: String,
}

/// Process-wide configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind port for the combined HTTP + WebSocket listener.
    pub port: u16,
    /// Path prefix the duplex transport is mounted under.
    pub socket_io_path: String,
    /// Redis connection string. `None` runs the broker single-node with an
    /// in-process store, disabling cross-replica lease and fan-out.
    pub redis_url: Option<String>,
    /// TURN credentials for the `game` signaling channel.
    pub game_turn: Option<TurnConfig>,
    /// TURN credentials for the `video` signaling channel.
    pub video_turn: Option<TurnConfig>,
    /// Admin shared secret. `None` disables the admin auth path entirely.
    pub admin_server_key: Option<String>,
    /// JWT verification secret (HS256) for non-admin tokens, supplied by
    /// the external profile/auth provider out-of-band.
    pub jwt_secret: Option<String>,
    /// Matching-cycle period.
    pub tick_interval: Duration,
    /// Tick-leader lease TTL.
    pub lease_ttl: Duration,
    /// Per-partition hydration batch size for one matching cycle.
    pub match_batch_size: usize,
    /// Handshake timeout for a `PendingRoom`.
    pub pending_room_ttl: Duration,
    /// Storage TTL for a persisted `PendingRoom` record.
    pub room_persist_ttl: Duration,
    /// Storage TTL for socket<->uid bindings.
    pub socket_binding_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            socket_io_path: "/socket.io".to_string(),
            redis_url: None,
            game_turn: None,
            video_turn: None,
            admin_server_key: None,
            jwt_secret: None,
            tick_interval: Duration::from_millis(crate::DEFAULT_TICK_INTERVAL_MS),
            lease_ttl: Duration::from_millis(crate::DEFAULT_LEASE_TTL_MS),
            match_batch_size: crate::DEFAULT_MATCH_BATCH_SIZE,
            pending_room_ttl: Duration::from_secs(crate::PENDING_ROOM_TTL_SECS),
            room_persist_ttl: Duration::from_secs(crate::ROOM_PERSIST_TTL_SECS),
            socket_binding_ttl: Duration::from_secs(crate::SOCKET_BINDING_TTL_SECS),
        }
    }
}

impl Config {
    /// Build configuration from environment variables, falling back to
    /// spec-nominal defaults for anything unset.
    pub fn from_env() -> Self {
        let default = Self::default();

        let game_turn = match (
            std::env::var("GAME_TURN_URL").ok(),
            std::env::var("GAME_TURN_SECRET").ok(),
        ) {
            (Some(url), Some(secret)) => Some(TurnConfig { url, secret }),
            _ => None,
        };

        let video_turn = match (
            std::env::var("VIDEO_TURN_URL").ok(),
            std::env::var("VIDEO_TURN_SECRET").ok(),
        ) {
            (Some(url), Some(secret)) => Some(TurnConfig { url, secret }),
            _ => None,
        };

        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),
            socket_io_path: std::env::var("SOCKET_IO_PATH")
                .unwrap_or(default.socket_io_path),
            redis_url: std::env::var("REDIS_URL").ok(),
            game_turn,
            video_turn,
            admin_server_key: std::env::var("MATCHMAKING_SERVER_KEY").ok(),
            jwt_secret: std::env::var("AUTH_SECRET").ok(),
            tick_interval: std::env::var("TICK_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default.tick_interval),
            lease_ttl: std::env::var("LEASE_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default.lease_ttl),
            match_batch_size: std::env::var("MATCH_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.match_batch_size),
            pending_room_ttl: std::env::var("PENDING_ROOM_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.pending_room_ttl),
            room_persist_ttl: std::env::var("ROOM_PERSIST_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.room_persist_ttl),
            socket_binding_ttl: std::env::var("SOCKET_BINDING_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.socket_binding_ttl),
        }
    }

    /// Whether the broker is running in distributed (Redis-backed) mode.
    pub fn is_distributed(&self) -> bool {
        self.redis_url.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_single_node() {
        let config = Config::default();
        assert!(!config.is_distributed());
        assert_eq!(config.port, 8080);
        assert_eq!(config.match_batch_size, 100);
    }
}
