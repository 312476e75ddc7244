//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! The rest of Rally only needs something that implements [`Codec`]; today
//! that is [`JsonCodec`], because browser clients speak JSON.
//!
//! Outbound messages are usually delivered to many sockets at once (a
//! roster update goes to every online user, a state delta to everyone
//! watching a match). [`Frame`] holds an already-encoded text payload
//! behind an `Arc`, so a fanout encodes once and clones a pointer per
//! recipient.

use std::fmt;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// An encoded, ready-to-send text message.
///
/// Cloning a `Frame` is a reference-count bump, not a copy of the text.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame(Arc<str>);

impl Frame {
    /// Wraps already-encoded text.
    pub fn from_text(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    /// Returns the encoded text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Frame").field(&&*self.0).finish()
    }
}

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task for the lifetime of the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;

    /// Encodes a value into a [`Frame`] suitable for a text message.
    ///
    /// # Errors
    /// Fails like [`encode`](Self::encode), or with
    /// `ProtocolError::InvalidMessage` if the output is not valid UTF-8.
    fn frame<T: Serialize>(&self, value: &T) -> Result<Frame, ProtocolError> {
        let bytes = self.encode(value)?;
        let text = String::from_utf8(bytes).map_err(|e| {
            ProtocolError::InvalidMessage(format!("frame is not UTF-8: {e}"))
        })?;
        Ok(Frame::from_text(text))
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// This is behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use rally_protocol::{Codec, GameClientMessage, JsonCodec};
///
/// let codec = JsonCodec;
/// let msg: GameClientMessage =
///     codec.decode(br#"{"type":"paddleMove","y":0.5}"#).unwrap();
/// assert_eq!(msg, GameClientMessage::PaddleMove { y: 0.5 });
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }

    fn frame<T: Serialize>(&self, value: &T) -> Result<Frame, ProtocolError> {
        // serde_json always emits UTF-8, so skip the byte round trip.
        serde_json::to_string(value)
            .map(Frame::from_text)
            .map_err(ProtocolError::Encode)
    }
}
