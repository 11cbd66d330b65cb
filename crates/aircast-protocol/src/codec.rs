//! Codec for encoding and decoding aircast control messages.
//!
//! Control messages travel as UTF-8 JSON text frames; the WebSocket layer
//! already provides message framing, so no length prefix is needed.

use thiserror::Error;

use crate::messages::{ClientMessage, ServerMessage};

/// Maximum control message size (64 KiB).
///
/// Session descriptors are small; anything larger is noise or abuse.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Message exceeds maximum size.
    #[error("Message size {0} exceeds maximum {MAX_MESSAGE_SIZE}")]
    MessageTooLarge(usize),

    /// Unparsable JSON, unknown `type`, or missing required fields.
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Decode an inbound control message from a text frame.
///
/// # Errors
///
/// Returns an error if the text is oversized, unparsable, carries an
/// unrecognized `type`, or is missing required fields. The caller is
/// expected to discard the message without side effects.
pub fn decode(text: &str) -> Result<ClientMessage, ProtocolError> {
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge(text.len()));
    }
    Ok(serde_json::from_str(text)?)
}

/// Encode an outbound control message to a text frame.
///
/// # Errors
///
/// Returns an error if serialization fails (a bug in the message types,
/// not a runtime condition).
pub fn encode(message: &ServerMessage) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid_message() {
        let msg = decode(r#"{"type":"register-listener"}"#).unwrap();
        assert_eq!(msg, ClientMessage::RegisterListener);
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        assert!(matches!(
            decode(r#"{"type":"subscribe","channel":"audio"}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_rejects_missing_type() {
        assert!(matches!(
            decode(r#"{"sdp":"v=0"}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        // offer without a target must not parse
        assert!(decode(r#"{"type":"offer","sdp":{}}"#).is_err());
    }

    #[test]
    fn test_decode_rejects_bad_json() {
        assert!(decode("not json at all").is_err());
    }

    #[test]
    fn test_decode_rejects_oversized() {
        let huge = format!(
            r#"{{"type":"answer","sdp":"{}"}}"#,
            "a".repeat(MAX_MESSAGE_SIZE)
        );
        assert!(matches!(
            decode(&huge),
            Err(ProtocolError::MessageTooLarge(_))
        ));
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let encoded = encode(&ServerMessage::status(false, 0)).unwrap();
        let decoded: ServerMessage = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, ServerMessage::status(false, 0));
    }
}
