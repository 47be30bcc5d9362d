//! Wire protocol: tagged inbound/outbound event envelopes (spec §6).
//!
//! Shape directly grounded on the teacher's `ClientMessage`/`ServerMessage`
//! in `network/protocol.rs`: externally-tagged serde enums, one variant per
//! named event, plus `to_json`/`from_json` convenience methods.

use serde::{Deserialize, Serialize};

use crate::queue::{Gender, Mode};

/// Handshake credential (spec §6): either a signed token, a raw uid (guest
/// path), or an admin identity plus shared server key.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthPayload {
    /// Dotted JWT, or a raw uid for the guest path.
    #[serde(default)]
    pub token: Option<String>,
    /// Explicit user id (used together with `server_key` for the admin
    /// path, or alone as a guest uid).
    #[serde(default)]
    pub user_id: Option<String>,
    /// Admin shared secret; only checked when `user_id == "server-admin"`.
    #[serde(default)]
    pub server_key: Option<String>,
}

/// Requested preferences on `join_queue` (spec §3, pre-tier-filtering).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PreferenceRequest {
    /// Desired partner gender.
    #[serde(default)]
    pub gender: Option<Gender>,
    /// Desired partner location.
    #[serde(default)]
    pub location: Option<String>,
}

/// A relayed signaling envelope (spec §4.7): offer/answer/ICE frames for
/// either the game or video channel.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignalFrame {
    /// Opaque SDP/ICE payload, forwarded without inspection.
    pub payload: serde_json::Value,
    /// Direct socket-id target, if the sender knows it (highest routing
    /// precedence).
    #[serde(default)]
    pub to: Option<String>,
    /// Target uid, if the sender knows it but not the socket id.
    #[serde(default)]
    pub target_uid: Option<String>,
}

/// Messages a client may send (spec §6, "Inbound events").
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join the waiting queue for `mode` with the given soft preferences.
    JoinQueue {
        /// Matching channel requested.
        mode: Mode,
        /// Soft preferences, tier-filtered on admission.
        #[serde(default)]
        preferences: PreferenceRequest,
    },
    /// Leave the waiting queue voluntarily.
    LeaveQueue,
    /// Tear down the current match/session.
    SkipMatch,
    /// Report that one of the expected services is ready.
    ConnectionStable {
        /// The room this readiness report applies to.
        room_id: String,
        /// Which expected service became ready.
        service: String,
    },
    /// Re-announce presence after a reconnect.
    Reconnect,
    /// Request freshly minted ICE server configuration.
    GetIceServers,
    /// Game-channel SDP offer.
    Offer(SignalFrame),
    /// Game-channel SDP answer.
    Answer(SignalFrame),
    /// Game-channel ICE candidate.
    #[serde(rename = "ice-candidate")]
    IceCandidate(SignalFrame),
    /// Video-channel SDP offer.
    #[serde(rename = "video-offer")]
    VideoOffer(SignalFrame),
    /// Video-channel SDP answer.
    #[serde(rename = "video-answer")]
    VideoAnswer(SignalFrame),
    /// Video-channel ICE candidate.
    #[serde(rename = "video-ice-candidate")]
    VideoIceCandidate(SignalFrame),
    /// Send an invite to `target_uid`.
    SendInvite {
        /// Recipient uid.
        target_uid: String,
    },
    /// Accept an invite from `inviter_uid`.
    AcceptInvite {
        /// Sender uid of the original invite.
        inviter_uid: String,
    },
    /// Reject an invite from `inviter_uid`.
    RejectInvite {
        /// Sender uid of the original invite.
        inviter_uid: String,
    },
    /// Admin: force-disconnect and ban a user.
    AdminKickUser {
        /// Target uid.
        uid: String,
        /// Reason surfaced to the target.
        #[serde(default)]
        reason: Option<String>,
    },
    /// Admin: ban a user for a bounded or indefinite duration.
    AdminBanUser {
        /// Target uid.
        uid: String,
        /// Reason surfaced to the target.
        reason: String,
        /// Duration in minutes, `0` for indefinite.
        #[serde(default)]
        duration_minutes: i64,
    },
    /// Admin: lift an existing ban.
    AdminUnbanUser {
        /// Target uid.
        uid: String,
    },
    /// Admin: force-disconnect without banning.
    AdminForceDisconnect {
        /// Target uid.
        uid: String,
    },
}

/// One ICE server entry (STUN or TURN).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServerEntry {
    /// One or more server URLs.
    pub urls: Vec<String>,
    /// TURN username, absent for STUN-only entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// TURN credential, absent for STUN-only entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// Per-channel ICE configuration minted for a session (spec §4.8).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IceServers {
    /// Entries for the game channel.
    pub game: Vec<IceServerEntry>,
    /// Entries for the video channel.
    pub video: Vec<IceServerEntry>,
}

/// Messages the server may send (spec §6, "Outbound events").
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A pairing has been created; begin the peer handshake.
    MatchFound {
        /// Shared room id.
        room_id: String,
        /// This recipient's role in the pairing.
        role: String,
        /// Peer's current socket id.
        opponent_id: String,
        /// Peer's uid.
        opponent_uid: String,
        /// Whether this recipient should initiate the WebRTC offer.
        is_initiator: bool,
        /// Freshly minted ICE configuration.
        ice_servers: IceServers,
        /// Set when this message represents a reconnection re-announce
        /// rather than the original pairing.
        #[serde(skip_serializing_if = "Option::is_none")]
        is_reconnection: Option<bool>,
    },
    /// All expected services are ready; the session is now active.
    SessionEstablished {
        /// The room that was finalized.
        room_id: String,
    },
    /// The match has been torn down by a skip or disconnect.
    MatchSkipped,
    /// The match could not proceed (handshake timeout, abort).
    MatchError {
        /// Human-readable reason.
        message: String,
    },
    /// The opponent reconnected under a new socket id.
    OpponentReconnected {
        /// The opponent's new socket id.
        opponent_socket_id: String,
    },
    /// The recipient has waited long enough to trigger client-side bot
    /// fallback.
    StartBotMode {
        /// Always `"timeout_waiting"` (spec §8 scenario 4).
        reason: String,
    },
    /// Legacy no-match notice.
    NoMatchFound {
        /// Why no match was found.
        reason: String,
        /// How long the client had waited, in ms.
        waited_ms: i64,
    },
    /// The recipient has been banned.
    Banned {
        /// Ban reason.
        reason: String,
        /// Remaining minutes, if bounded.
        remaining_minutes: i64,
        /// Human-readable message.
        message: String,
    },
    /// The recipient has been force-disconnected by an admin.
    Kicked {
        /// Reason surfaced to the client.
        reason: String,
    },
    /// Freshly minted ICE configuration, requested on demand.
    IceServersConfig {
        /// The ICE configuration.
        ice_servers: IceServers,
    },
    /// An invite arrived from another user.
    ReceiveInvite {
        /// Sender uid.
        inviter_uid: String,
    },
    /// An invite this user sent was rejected.
    InviteRejected {
        /// Uid that rejected the invite.
        target_uid: String,
    },
    /// An invite could not be delivered or accepted.
    InviteError {
        /// Human-readable reason.
        message: String,
    },
    /// A relayed signaling frame, stamped with sender identity.
    Signal {
        /// Which inbound event this relays (`offer`, `video-answer`, ...).
        kind: String,
        /// Opaque SDP/ICE payload.
        payload: serde_json::Value,
        /// Sender's socket id.
        from: String,
        /// Sender's uid, when resolvable.
        #[serde(skip_serializing_if = "Option::is_none")]
        from_uid: Option<String>,
    },
    /// Generic error surfaced for aborted operations (spec §7,
    /// `ProfileMissing`, malformed requests).
    Error {
        /// Human-readable message.
        message: String,
    },
}

impl ServerMessage {
    /// Serialize to the wire JSON representation.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ClientMessage {
    /// Parse an inbound frame from its wire JSON representation.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_queue_round_trips() {
        let raw = r#"{"type":"join_queue","mode":"random","preferences":{"gender":"male"}}"#;
        let msg = ClientMessage::from_json(raw).unwrap();
        match msg {
            ClientMessage::JoinQueue { mode, preferences } => {
                assert_eq!(mode, Mode::Random);
                assert_eq!(preferences.gender, Some(Gender::Male));
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn server_message_tags_snake_case_type() {
        let msg = ServerMessage::MatchSkipped;
        let json = msg.to_json().unwrap();
        assert_eq!(json, r#"{"type":"match_skipped"}"#);
    }

    #[test]
    fn signal_frame_preserves_opaque_payload() {
        let raw = r#"{"type":"ice-candidate","payload":{"candidate":"abc"},"to":"s2"}"#;
        let msg = ClientMessage::from_json(raw).unwrap();
        match msg {
            ClientMessage::IceCandidate(frame) => {
                assert_eq!(frame.to, Some("s2".to_string()));
                assert_eq!(frame.payload["candidate"], "abc");
            }
            _ => panic!("wrong variant"),
        }
    }
}
