//! Unified error type for the server.

use rally_match::MatchError;
use rally_presence::PresenceError;
use rally_protocol::ProtocolError;
use rally_transport::TransportError;

use crate::AuthError;

/// Top-level error wrapping every crate-specific error.
///
/// Connection handlers return this; the accept loop logs it and moves on,
/// so none of these ever take the server down.
#[derive(Debug, thiserror::Error)]
pub enum RallyError {
    /// Binding, accepting, sending, or receiving failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A message could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A match operation was rejected.
    #[error(transparent)]
    Match(#[from] MatchError),

    /// A presence or chat operation was rejected.
    #[error(transparent)]
    Presence(#[from] PresenceError),

    /// The client could not be authenticated.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rally_protocol::SessionId;

    #[test]
    fn test_from_transport_error_wraps_and_displays_cause() {
        let err = TransportError::ConnectionClosed("gone".into());
        let rally_err: RallyError = err.into();
        assert!(matches!(rally_err, RallyError::Transport(_)));
        assert!(rally_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error_wraps() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let rally_err: RallyError = err.into();
        assert!(matches!(rally_err, RallyError::Protocol(_)));
    }

    #[test]
    fn test_from_match_error_keeps_variant() {
        let id = SessionId::new();
        let rally_err: RallyError = MatchError::SessionNotFound(id).into();
        assert!(matches!(
            rally_err,
            RallyError::Match(MatchError::SessionNotFound(found)) if found == id
        ));
    }

    #[test]
    fn test_from_presence_error_wraps() {
        let err = PresenceError::MessageTooLong { len: 301, max: 300 };
        let rally_err: RallyError = err.into();
        assert!(matches!(rally_err, RallyError::Presence(_)));
    }

    #[test]
    fn test_from_auth_error_wraps() {
        let rally_err: RallyError = AuthError::MissingCredential.into();
        assert!(matches!(rally_err, RallyError::Auth(AuthError::MissingCredential)));
    }
}
