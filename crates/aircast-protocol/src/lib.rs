//! # aircast-protocol
//!
//! Wire protocol definitions for the aircast signaling relay.
//!
//! Control messages are UTF-8 JSON text frames exchanged over a WebSocket
//! connection. Binary WebSocket frames carry opaque media data and never
//! pass through this crate.
//!
//! ## Message Types
//!
//! - `register-broadcaster` / `register-listener` - Role claims
//! - `offer` / `answer` / `candidate` - Session negotiation
//! - `peer-joined` / `peer-left` / `status` - Presence notifications
//!
//! ## Example
//!
//! ```rust
//! use aircast_protocol::{codec, ServerMessage};
//!
//! let message = ServerMessage::status(true, 3);
//! let encoded = codec::encode(&message).unwrap();
//! assert!(encoded.contains("\"broadcasterOnline\":true"));
//! ```

pub mod codec;
pub mod messages;

pub use codec::{decode, encode, ProtocolError};
pub use messages::{ClientMessage, ServerMessage, BROADCASTER};
