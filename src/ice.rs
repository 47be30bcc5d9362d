//! TURN/STUN credential minting (spec §4.8).
//!
//! HMAC crate pairing grounded on `rendezvous.rs`
//! (`examples/other_examples/...rendezvous.rs.rs`: `use hmac::{Hmac, Mac}`),
//! adapted from SHA-256 to SHA-1 since spec §4.8 pins the digest
//! algorithm explicitly.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::config::TurnConfig;
use crate::protocol::{IceServerEntry, IceServers};

type HmacSha1 = Hmac<Sha1>;

/// Static STUN entries every credential list begins with, regardless of
/// TURN configuration (spec §4.8).
const STUN_URLS: &[&str] = &["stun:stun.l.google.com:19302"];

/// Mints per-user ICE server lists for the game and video channels.
#[derive(Clone)]
pub struct IceMinter {
    game_turn: Option<TurnConfig>,
    video_turn: Option<TurnConfig>,
}

impl IceMinter {
    /// Build a minter from the configured TURN endpoints. Either may be
    /// `None`, in which case that channel's list is STUN-only.
    pub fn new(game_turn: Option<TurnConfig>, video_turn: Option<TurnConfig>) -> Self {
        Self {
            game_turn,
            video_turn,
        }
    }

    /// Mint both lists for `uid` at `now_unix_secs`.
    pub fn mint(&self, uid: &str, now_unix_secs: i64) -> IceServers {
        IceServers {
            game: channel_entries(self.game_turn.as_ref(), uid, now_unix_secs),
            video: channel_entries(self.video_turn.as_ref(), uid, now_unix_secs),
        }
    }
}

fn channel_entries(
    turn: Option<&TurnConfig>,
    uid: &str,
    now_unix_secs: i64,
) -> Vec<IceServerEntry> {
    let mut entries: Vec<IceServerEntry> = STUN_URLS
        .iter()
        .map(|url| IceServerEntry {
            urls: vec![url.to_string()],
            username: None,
            credential: None,
        })
        .collect();

    if let Some(turn) = turn {
        let (username, credential) = mint_turn_credential(&turn.secret, uid, now_unix_secs);
        entries.push(IceServerEntry {
            urls: vec![turn.url.clone()],
            username: Some(username),
            credential: Some(credential),
        });
    }

    entries
}

/// `username = "{unixTs + 86400}:{uid}"`,
/// `credential = base64(HMAC-SHA1(secret, username))` (spec §4.8, §8
/// invariant 8). 24h TTL is encoded directly in the expiry timestamp.
fn mint_turn_credential(secret: &str, uid: &str, now_unix_secs: i64) -> (String, String) {
    let expiry = now_unix_secs + crate::ICE_CREDENTIAL_TTL_SECS as i64;
    let username = format!("{expiry}:{uid}");

    let mut mac =
        HmacSha1::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(username.as_bytes());
    let credential = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    (username, credential)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stun_only_when_no_turn_configured() {
        let minter = IceMinter::new(None, None);
        let servers = minter.mint("alice", 0);
        assert_eq!(servers.game.len(), 1);
        assert!(servers.game[0].username.is_none());
    }

    #[test]
    fn turn_credential_is_deterministic() {
        let turn = TurnConfig {
            url: "turn:turn.example.com:3478".to_string(),
            secret: "s3cret".to_string(),
        };
        let minter = IceMinter::new(Some(turn.clone()), None);
        let a = minter.mint("alice", 1_000);
        let b = minter.mint("alice", 1_000);
        assert_eq!(a.game[1].credential, b.game[1].credential);

        let (expected_username, expected_credential) =
            mint_turn_credential(&turn.secret, "alice", 1_000);
        assert_eq!(a.game[1].username, Some(expected_username));
        assert_eq!(a.game[1].credential, Some(expected_credential));
    }

    #[test]
    fn username_encodes_24h_expiry() {
        let (username, _) = mint_turn_credential("secret", "alice", 1_000);
        assert_eq!(username, format!("{}:alice", 1_000 + 86_400));
    }
}
