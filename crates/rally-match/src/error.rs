//! Error types for the match layer.

use rally_protocol::{close, SessionId, UserId};
use rally_transport::CloseReason;

/// Errors that can occur during match operations.
///
/// Everything else that can go "wrong" in a match (paddle input from a
/// spectator, ticks on a finished session) is absorbed as a no-op: game
/// clients race server state constantly and those races are not errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    /// No session is registered under this id.
    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    /// The identity already holds a seat in this session.
    #[error("user {user} already seated in session {session}")]
    DuplicateParticipant { session: SessionId, user: UserId },
}

impl MatchError {
    /// The close frame a connection should receive for this error.
    pub fn close_reason(&self) -> CloseReason {
        match self {
            Self::SessionNotFound(_) => close::session_not_found(),
            Self::DuplicateParticipant { .. } => close::duplicate_participant(),
        }
    }
}
