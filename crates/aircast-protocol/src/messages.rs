//! Control message types for the aircast protocol.
//!
//! Messages are internally tagged on `type` so the wire format matches the
//! JSON the browser endpoints produce and consume. Session and candidate
//! descriptors are carried as opaque JSON values; the relay never inspects
//! them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The `from`/`target` name reserved for the broadcaster connection.
///
/// Listeners are addressed by generated identity; the broadcaster is unique
/// per session and addressed by this well-known name.
pub const BROADCASTER: &str = "broadcaster";

/// A control message sent by a connected client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Claim the broadcaster role. Subject to the access policy.
    #[serde(rename = "register-broadcaster")]
    RegisterBroadcaster {
        /// Shared secret, when the server is configured to require one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },

    /// Claim the listener role.
    #[serde(rename = "register-listener")]
    RegisterListener,

    /// Session offer from the broadcaster toward one listener.
    #[serde(rename = "offer")]
    Offer {
        /// Identity of the listener the offer is for.
        target: String,
        /// Opaque session descriptor.
        sdp: Value,
    },

    /// Session answer from a listener back to the broadcaster.
    #[serde(rename = "answer")]
    Answer {
        /// Opaque session descriptor.
        sdp: Value,
    },

    /// Network-path candidate for a single peer connection.
    #[serde(rename = "candidate")]
    Candidate {
        /// Target identity. Required when the sender is the broadcaster;
        /// listeners may omit it (their candidates always go to the
        /// broadcaster).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        /// Opaque candidate descriptor.
        candidate: Value,
    },
}

/// A control message sent by the relay to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Registration acknowledgment carrying the assigned role.
    #[serde(rename = "role")]
    Role {
        /// `"broadcaster"` or `"listener"`.
        role: String,
        /// Generated identity; present only for listeners.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Offer forwarded to its target listener.
    #[serde(rename = "offer")]
    Offer {
        /// Opaque session descriptor.
        sdp: Value,
        /// Always [`BROADCASTER`].
        from: String,
    },

    /// Answer forwarded to the broadcaster.
    #[serde(rename = "answer")]
    Answer {
        /// Opaque session descriptor.
        sdp: Value,
        /// Identity of the listener that answered.
        from: String,
    },

    /// Candidate forwarded to its resolved target.
    #[serde(rename = "candidate")]
    Candidate {
        /// Opaque candidate descriptor.
        candidate: Value,
        /// Sender identity, or [`BROADCASTER`].
        from: String,
    },

    /// A listener joined; sent to the broadcaster so it can initiate
    /// negotiation toward that identity.
    #[serde(rename = "peer-joined")]
    PeerJoined {
        /// Identity of the new listener.
        id: String,
    },

    /// A listener left; sent to the broadcaster.
    #[serde(rename = "peer-left")]
    PeerLeft {
        /// Identity of the departed listener.
        id: String,
    },

    /// Session summary, broadcast on every registry change and on a fixed
    /// period.
    #[serde(rename = "status")]
    #[serde(rename_all = "camelCase")]
    Status {
        /// Whether a broadcaster currently occupies the slot.
        broadcaster_online: bool,
        /// Number of registered listeners.
        listener_count: usize,
    },
}

impl ServerMessage {
    /// Registration ack for the broadcaster role.
    #[must_use]
    pub fn broadcaster_role() -> Self {
        ServerMessage::Role {
            role: BROADCASTER.to_string(),
            id: None,
        }
    }

    /// Registration ack for a listener, carrying its identity.
    #[must_use]
    pub fn listener_role(id: impl Into<String>) -> Self {
        ServerMessage::Role {
            role: "listener".to_string(),
            id: Some(id.into()),
        }
    }

    /// Offer forwarded from the broadcaster.
    #[must_use]
    pub fn offer(sdp: Value) -> Self {
        ServerMessage::Offer {
            sdp,
            from: BROADCASTER.to_string(),
        }
    }

    /// Answer forwarded from a listener.
    #[must_use]
    pub fn answer(sdp: Value, from: impl Into<String>) -> Self {
        ServerMessage::Answer {
            sdp,
            from: from.into(),
        }
    }

    /// Candidate forwarded from either side.
    #[must_use]
    pub fn candidate(candidate: Value, from: impl Into<String>) -> Self {
        ServerMessage::Candidate {
            candidate,
            from: from.into(),
        }
    }

    /// Join notification for the broadcaster.
    #[must_use]
    pub fn peer_joined(id: impl Into<String>) -> Self {
        ServerMessage::PeerJoined { id: id.into() }
    }

    /// Leave notification for the broadcaster.
    #[must_use]
    pub fn peer_left(id: impl Into<String>) -> Self {
        ServerMessage::PeerLeft { id: id.into() }
    }

    /// Session summary.
    #[must_use]
    pub fn status(broadcaster_online: bool, listener_count: usize) -> Self {
        ServerMessage::Status {
            broadcaster_online,
            listener_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_broadcaster_wire_format() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"register-broadcaster"}"#).unwrap();
        assert_eq!(msg, ClientMessage::RegisterBroadcaster { token: None });

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"register-broadcaster","token":"s3cret"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::RegisterBroadcaster {
                token: Some("s3cret".to_string())
            }
        );
    }

    #[test]
    fn test_register_listener_wire_format() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"register-listener"}"#).unwrap();
        assert_eq!(msg, ClientMessage::RegisterListener);
    }

    #[test]
    fn test_offer_carries_opaque_descriptor() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"offer","target":"peer_1","sdp":{"type":"offer","sdp":"v=0..."}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::Offer { target, sdp } => {
                assert_eq!(target, "peer_1");
                assert_eq!(sdp["type"], "offer");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_candidate_target_optional() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"candidate","candidate":{"candidate":"candidate:0 1 UDP"}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Candidate {
                target: None,
                candidate: json!({"candidate": "candidate:0 1 UDP"}),
            }
        );
    }

    #[test]
    fn test_status_field_names() {
        let encoded = serde_json::to_string(&ServerMessage::status(true, 2)).unwrap();
        assert_eq!(
            encoded,
            r#"{"type":"status","broadcasterOnline":true,"listenerCount":2}"#
        );
    }

    #[test]
    fn test_listener_role_reply() {
        let encoded = serde_json::to_string(&ServerMessage::listener_role("peer_a1")).unwrap();
        assert_eq!(encoded, r#"{"type":"role","role":"listener","id":"peer_a1"}"#);

        let encoded = serde_json::to_string(&ServerMessage::broadcaster_role()).unwrap();
        assert_eq!(encoded, r#"{"type":"role","role":"broadcaster"}"#);
    }

    #[test]
    fn test_forwarded_offer_tagged_from_broadcaster() {
        let encoded =
            serde_json::to_string(&ServerMessage::offer(json!({"sdp": "v=0"}))).unwrap();
        assert_eq!(
            encoded,
            r#"{"type":"offer","sdp":{"sdp":"v=0"},"from":"broadcaster"}"#
        );
    }

    #[test]
    fn test_peer_notifications() {
        let encoded = serde_json::to_string(&ServerMessage::peer_joined("peer_b2")).unwrap();
        assert_eq!(encoded, r#"{"type":"peer-joined","id":"peer_b2"}"#);

        let encoded = serde_json::to_string(&ServerMessage::peer_left("peer_b2")).unwrap();
        assert_eq!(encoded, r#"{"type":"peer-left","id":"peer_b2"}"#);
    }
}
