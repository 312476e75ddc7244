//! Error types for the protocol layer.
//!
//! Each crate in Rally defines its own error enum. A `ProtocolError`
//! always means the problem is in turning messages into text or back,
//! not in networking or in match/presence rules.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    ///
    /// The inner `serde_json::Error` is kept so the log line shows the
    /// original cause.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields, an
    /// unknown `type` tag, or wrong data types.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message is invalid at the protocol level.
    ///
    /// Used for payloads that serialize fine but cannot travel as a text
    /// frame, e.g. a codec producing non-UTF-8 output.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
