//! Match Session Engine for Rally.
//!
//! A match is two seated players and any number of spectators around one
//! ball. This crate owns the authoritative state of every match:
//!
//! - [`MatchSession`]: one match's seats, physics, and `Waiting → Active
//!   → Finished` lifecycle. Synchronous and socket-free.
//! - [`MatchEngine`]: the registry of sessions, with a lock per session.
//! - [`ResultReporter`]: where finished matches are announced.
//! - [`Ticker`]: fixed-cadence pacing for a session's tick loop.
//!
//! The engine never touches a connection. Every operation returns what
//! happened (`JoinOutcome`, `LeaveOutcome`, `TickOutput`) and the caller
//! turns that into messages.

mod config;
mod engine;
mod error;
mod reporter;
mod session;
mod ticker;

pub use config::MatchConfig;
pub use engine::MatchEngine;
pub use error::MatchError;
pub use reporter::{NoopReporter, ResultReporter};
pub use session::{
    Ball, JoinOutcome, LeaveOutcome, MatchSession, MatchStart, MatchStatus, Seat, SessionSummary,
    TickOutput,
};
pub use ticker::{TickInfo, Ticker};
