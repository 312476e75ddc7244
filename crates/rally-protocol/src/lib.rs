//! Wire protocol for Rally.
//!
//! This crate defines what clients and servers say to each other:
//!
//! - **Types** ([`UserId`], [`SessionId`], [`Identity`], [`Role`]): the
//!   identifiers and roles that appear inside messages.
//! - **Game channel** ([`GameClientMessage`], [`GameServerMessage`]).
//! - **Chat channel** ([`ChatClientMessage`], [`ChatServerMessage`]).
//! - **Codec** ([`Codec`] trait, [`JsonCodec`], [`Frame`]): how those
//!   messages are converted to and from text.
//! - **Close codes** ([`close`]): why the server hung up.
//!
//! The protocol layer sits between transport (raw frames) and the
//! match/presence engines. It doesn't know about connections or sessions;
//! it only knows how to serialize and deserialize messages.
//!
//! ```text
//! Transport (frames) → Protocol (messages) → Match engine / Presence hub
//! ```

mod chat;
pub mod close;
mod codec;
mod error;
mod game;
mod types;

pub use chat::{ChatClientMessage, ChatServerMessage, ChatTarget, OnlineUser};
pub use codec::{Codec, Frame};
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use game::{
    BallPosition, FinishReason, GameClientMessage, GameOver, GameServerMessage, GameWinner,
    Paddles, Score, StateDelta,
};
pub use types::{Identity, PlayerSummary, Role, SessionId, Side, UserId};
