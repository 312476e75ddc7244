//! Outward notification of finished matches.

use rally_protocol::{SessionId, UserId};

/// Receives the result of every finished match, exactly once.
///
/// Called synchronously from inside the engine on the transition to
/// `Finished`, after the session lock has been released. Implementations
/// must not block; anything slow (an HTTP call, a database write) belongs
/// in a task the implementation spawns itself. There is no retry.
pub trait ResultReporter: Send + Sync + 'static {
    /// `winner` is `None` when the match was abandoned with nobody seated.
    fn report(&self, session_id: SessionId, winner: Option<UserId>);
}

/// A reporter that discards results.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl ResultReporter for NoopReporter {
    fn report(&self, _session_id: SessionId, _winner: Option<UserId>) {}
}

impl<F> ResultReporter for F
where
    F: Fn(SessionId, Option<UserId>) + Send + Sync + 'static,
{
    fn report(&self, session_id: SessionId, winner: Option<UserId>) {
        self(session_id, winner)
    }
}
