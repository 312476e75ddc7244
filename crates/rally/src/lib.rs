//! # Rally
//!
//! Realtime backend for browser pong: authoritative two-player matches
//! with spectators, a global presence roster with chat, and round-robin
//! tournament pairing.
//!
//! The [`RallyServer`] accepts WebSocket connections, authenticates them
//! through your [`Authenticator`], and routes each one by path:
//!
//! - `/ws/chat` joins the presence hub (roster, chat, typing indicators).
//! - `/ws/<session-id>` or `/ws?gameId=<session-id>` joins a match.
//!
//! Sessions are created by whoever owns the server, usually an
//! orchestration layer calling [`RallyServer::engine`] once per pairing
//! of a [`schedule`]. A [`RallyHandle`] keeps that access after the
//! server starts running.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rally::prelude::*;
//!
//! struct AnyoneWithANumber;
//!
//! impl Authenticator for AnyoneWithANumber {
//!     async fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
//!         let id: u64 = token
//!             .parse()
//!             .map_err(|_| AuthError::Rejected("token must be a number".into()))?;
//!         Ok(Identity::new(UserId(id), format!("player-{id}")))
//!     }
//! }
//!
//! # async fn run() -> Result<(), RallyError> {
//! let server = RallyServerBuilder::new()
//!     .bind("0.0.0.0:8080")
//!     .build(AnyoneWithANumber)
//!     .await?;
//! let session = server.engine().create_session().await;
//! println!("play at /ws/{session}");
//! server.run().await
//! # }
//! ```

mod auth;
mod error;
mod game;
mod handler;
mod route;
mod server;

pub use auth::{AuthError, Authenticator};
pub use error::RallyError;
pub use route::Route;
pub use server::{RallyHandle, RallyServer, RallyServerBuilder, ServerConfig};

pub use rally_match::{MatchConfig, MatchEngine, ResultReporter};
pub use rally_pairing::schedule;
pub use rally_presence::{HubConfig, PresenceHub};

/// Everything needed to stand up a server.
pub mod prelude {
    pub use crate::{
        AuthError, Authenticator, HubConfig, MatchConfig, RallyError, RallyHandle, RallyServer,
        RallyServerBuilder, ResultReporter, ServerConfig,
    };
    pub use rally_pairing::{Pairing, Round, Schedule, schedule};
    pub use rally_protocol::{Identity, SessionId, UserId};
}
