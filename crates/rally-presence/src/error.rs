//! Error types for the presence layer.

use rally_protocol::ProtocolError;
use rally_transport::ConnectionId;

/// Errors that can occur during presence and fanout operations.
///
/// None of these reach the wire: the adapter logs them and moves on.
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    /// A chat message exceeded the configured length.
    #[error("message is {len} characters, limit is {max}")]
    MessageTooLong { len: usize, max: usize },

    /// The connection never called `connect`, so it has no identity.
    #[error("connection {0} is not registered for presence")]
    NotConnected(ConnectionId),

    /// Encoding an outbound message failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
