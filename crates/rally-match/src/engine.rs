//! The session registry: creates, tracks, and drives match sessions.

use std::collections::HashMap;
use std::sync::Arc;

use rally_protocol::{FinishReason, GameOver, GameWinner, Identity, Role, SessionId, UserId};
use rally_transport::ConnectionId;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{
    JoinOutcome, LeaveOutcome, MatchConfig, MatchError, MatchSession, MatchStatus, NoopReporter,
    ResultReporter, SessionSummary, TickOutput,
};

type SessionSlot = Arc<Mutex<MatchSession>>;

/// Owns every match session in the process.
///
/// Locking: the registry map has one lock, used only for insert, remove,
/// lookup, and listing. Each session has its own lock, so play in one
/// match never waits on another. When both are needed, the registry lock
/// is taken first.
pub struct MatchEngine {
    sessions: Mutex<HashMap<SessionId, SessionSlot>>,
    config: MatchConfig,
    reporter: Arc<dyn ResultReporter>,
}

impl MatchEngine {
    /// Creates an engine that discards match results.
    pub fn new(config: MatchConfig) -> Self {
        Self::with_reporter(config, Arc::new(NoopReporter))
    }

    pub fn with_reporter(config: MatchConfig, reporter: Arc<dyn ResultReporter>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            config,
            reporter,
        }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    // -- Registry -----------------------------------------------------------

    /// Registers a new waiting session and returns its id.
    pub async fn create_session(&self) -> SessionId {
        let id = SessionId::new();
        let session = MatchSession::new(id, self.config.clone());
        self.sessions
            .lock()
            .await
            .insert(id, Arc::new(Mutex::new(session)));
        tracing::info!(session_id = %id, "session created");
        id
    }

    pub async fn contains(&self, id: SessionId) -> bool {
        self.sessions.lock().await.contains_key(&id)
    }

    /// A snapshot of one session, or `None` if unknown.
    pub async fn get(&self, id: SessionId) -> Option<SessionSummary> {
        let slot = self.slot(id).await.ok()?;
        let session = slot.lock().await;
        Some(session.summary())
    }

    pub async fn status(&self, id: SessionId) -> Result<MatchStatus, MatchError> {
        let slot = self.slot(id).await?;
        let status = slot.lock().await.status();
        Ok(status)
    }

    /// Snapshots of every registered session.
    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let slots: Vec<SessionSlot> = self.sessions.lock().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(slots.len());
        for slot in slots {
            summaries.push(slot.lock().await.summary());
        }
        summaries
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Removes a session regardless of its state.
    ///
    /// An active match deleted this way is finished as abandoned under its
    /// own lock, reported, and its game over returned so the caller can
    /// tell whoever is still watching. A tick already holding the session
    /// then finds it finished, so the result is reported exactly once.
    pub async fn delete_session(&self, id: SessionId) -> Result<Option<GameOver>, MatchError> {
        let slot = self
            .sessions
            .lock()
            .await
            .remove(&id)
            .ok_or(MatchError::SessionNotFound(id))?;

        let game_over = slot.lock().await.abandon();
        tracing::info!(session_id = %id, was_active = game_over.is_some(), "session deleted");
        if let Some(over) = &game_over {
            self.report(id, over);
        }
        Ok(game_over)
    }

    async fn slot(&self, id: SessionId) -> Result<SessionSlot, MatchError> {
        self.sessions
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(MatchError::SessionNotFound(id))
    }

    // -- Participation ------------------------------------------------------

    /// Seats `identity` (connected through `conn`) in a session.
    ///
    /// # Errors
    /// `SessionNotFound` for an unknown id, `DuplicateParticipant` if the
    /// identity is already seated in this session.
    pub async fn join(
        &self,
        id: SessionId,
        conn: ConnectionId,
        identity: Identity,
    ) -> Result<JoinOutcome, MatchError> {
        self.join_with(id, conn, identity, |_| {}).await
    }

    /// Like [`join`](Self::join), but calls `on_joined` with the outcome
    /// while the session is still locked. Whatever it does happens before
    /// any other join on the same session can complete.
    ///
    /// # Errors
    /// As for [`join`](Self::join); `on_joined` is not called.
    pub async fn join_with<F>(
        &self,
        id: SessionId,
        conn: ConnectionId,
        identity: Identity,
        on_joined: F,
    ) -> Result<JoinOutcome, MatchError>
    where
        F: FnOnce(&JoinOutcome) + Send,
    {
        let slot = self.slot(id).await?;
        let user_id = identity.id;
        let outcome = {
            let mut session = slot.lock().await;
            let outcome = session.join(conn, identity);
            if let Ok(out) = &outcome {
                on_joined(out);
            }
            outcome
        };

        match &outcome {
            Ok(out) => {
                tracing::info!(session_id = %id, %conn, %user_id, role = %out.role, "joined session");
                if out.started.is_some() {
                    tracing::info!(session_id = %id, "match started");
                }
            }
            Err(e) => tracing::warn!(session_id = %id, %conn, %user_id, error = %e, "join rejected"),
        }
        outcome
    }

    /// Removes a connection from a session.
    ///
    /// If this ends an active match, the result is reported. A finished
    /// session left with no occupants is evicted from the registry.
    pub async fn leave(
        &self,
        id: SessionId,
        conn: ConnectionId,
    ) -> Result<LeaveOutcome, MatchError> {
        let slot = self.slot(id).await?;
        let (outcome, evictable) = {
            let mut session = slot.lock().await;
            let outcome = session.leave(conn);
            (outcome, session.is_empty() && session.status().is_finished())
        };

        if let Some(role) = outcome.role {
            tracing::info!(session_id = %id, %conn, %role, "left session");
        }
        if let Some(over) = &outcome.game_over {
            tracing::info!(session_id = %id, reason = ?over.reason, "match ended by departure");
            self.report(id, over);
        }
        if evictable {
            self.evict_if_idle(id).await;
        }
        Ok(outcome)
    }

    /// Applies paddle input. Spectators, non-active sessions, and
    /// non-finite values are silently ignored.
    pub async fn set_paddle(&self, id: SessionId, role: Role, y: f64) -> Result<(), MatchError> {
        let slot = self.slot(id).await?;
        slot.lock().await.set_paddle(role, y);
        Ok(())
    }

    /// Advances an active session by the time since its previous tick.
    ///
    /// Returns `Ok(None)` for a session that is not active. A tick that
    /// decides the match reports the result before returning.
    pub async fn tick(&self, id: SessionId) -> Result<Option<TickOutput>, MatchError> {
        let slot = self.slot(id).await?;
        Ok(self.tick_slot(id, &slot).await)
    }

    async fn tick_slot(&self, id: SessionId, slot: &SessionSlot) -> Option<TickOutput> {
        let output = slot.lock().await.tick(Instant::now());

        if let Some(over) = output.as_ref().and_then(|o| o.game_over.as_ref()) {
            tracing::info!(session_id = %id, reason = ?over.reason, "match won");
            self.report(id, over);
        }
        output
    }

    fn report(&self, id: SessionId, over: &GameOver) {
        let winner: Option<UserId> = match (&over.winner, over.reason) {
            (GameWinner::Player(player), FinishReason::Score | FinishReason::Forfeit) => {
                Some(player.id)
            }
            _ => None,
        };
        self.reporter.report(id, winner);
    }

    /// Removes a session if it is still finished and empty once both
    /// locks are held; a spectator may have joined in between.
    async fn evict_if_idle(&self, id: SessionId) {
        let mut sessions = self.sessions.lock().await;
        let Some(slot) = sessions.get(&id).cloned() else {
            return;
        };
        let session = slot.lock().await;
        if session.is_empty() && session.status().is_finished() {
            drop(session);
            sessions.remove(&id);
            tracing::info!(session_id = %id, "session evicted");
        }
    }
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self::new(MatchConfig::default())
    }
}

impl std::fmt::Debug for MatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
