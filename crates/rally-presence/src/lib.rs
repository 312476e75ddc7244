//! Presence & fanout hub for Rally.
//!
//! Tracks which users are online (one entry per user, one or more
//! connections per entry), which broadcast groups each connection belongs
//! to, and delivers messages to them:
//!
//! - **Global group**: every chat connection. Roster updates, public chat,
//!   and typing indicators go here.
//! - **Match groups**: everyone in one match. State deltas and game events
//!   go here.
//! - **Direct**: all connections of specific users (private chat).
//!
//! The hub never touches a socket. Each connection is a [`ConnectionRef`]
//! whose bounded queue the transport side drains.

mod config;
mod connection;
mod error;
mod hub;

pub use config::HubConfig;
pub use connection::{ConnectionRef, Group, Outbound, OutboundReceiver, OutboundSender};
pub use error::PresenceError;
pub use hub::PresenceHub;
