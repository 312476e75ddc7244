//! Handles the hub uses to reach a socket.

use rally_protocol::{Frame, SessionId};
use rally_transport::{CloseReason, ConnectionId};
use tokio::sync::mpsc;

/// One item on a connection's outbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// An encoded text message.
    Frame(Frame),
    /// Close the socket after everything queued before this.
    Close(CloseReason),
}

pub type OutboundSender = mpsc::Sender<Outbound>;
pub type OutboundReceiver = mpsc::Receiver<Outbound>;

/// Addresses "send to this socket" without exposing the socket.
///
/// The transport side owns the receiving half and writes whatever
/// arrives, in order.
#[derive(Debug, Clone)]
pub struct ConnectionRef {
    pub id: ConnectionId,
    pub sender: OutboundSender,
}

impl ConnectionRef {
    /// Creates a handle and the queue it feeds.
    pub fn channel(id: ConnectionId, capacity: usize) -> (Self, OutboundReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { id, sender }, receiver)
    }
}

/// A set of connections that receive the same broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    /// Every presence (chat) connection.
    Global,
    /// Everyone seated in or watching one match.
    Match(SessionId),
}

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Match(id) => write!(f, "match:{id}"),
        }
    }
}
