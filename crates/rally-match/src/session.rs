//! A single match: seats, spectators, and the ball physics.
//!
//! `MatchSession` is plain synchronous state. It never sends anything;
//! every mutating call returns what happened and the caller decides who
//! to tell. The [`MatchEngine`](crate::MatchEngine) wraps each session in
//! its own lock.

use std::collections::HashSet;
use std::fmt;

use rand::Rng;
use rally_protocol::{
    BallPosition, FinishReason, GameOver, GameWinner, Identity, Paddles, PlayerSummary, Role,
    Score, SessionId, Side, StateDelta,
};
use rally_transport::ConnectionId;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::{MatchConfig, MatchError};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle of a session. Transitions only move forward:
///
/// ```text
/// Waiting → Active → Finished
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    /// Fewer than two seats filled.
    Waiting,
    /// Both seats filled; the ball is moving.
    Active,
    /// Terminal. No more ticks, no re-seating.
    Finished,
}

impl MatchStatus {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_finished(self) -> bool {
        matches!(self, Self::Finished)
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Active => write!(f, "active"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

// ---------------------------------------------------------------------------
// Pieces
// ---------------------------------------------------------------------------

/// Ball position and velocity in playfield units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Ball {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
}

impl Ball {
    pub fn position(&self) -> BallPosition {
        BallPosition {
            x: self.x,
            y: self.y,
        }
    }
}

/// Who holds a seat, and through which connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    pub conn: ConnectionId,
    pub identity: Identity,
}

/// Returned by [`MatchSession::join`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub role: Role,
    /// Set when this join filled the second seat and play began.
    pub started: Option<MatchStart>,
}

/// Both seat holders at the moment play begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchStart {
    pub left: PlayerSummary,
    pub right: PlayerSummary,
}

/// Returned by [`MatchSession::leave`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LeaveOutcome {
    /// The role the connection held, or `None` if it was not in the session.
    pub role: Option<Role>,
    /// Set when the departure ended an active match.
    pub game_over: Option<GameOver>,
}

/// Returned by [`MatchSession::advance`] for an active session.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutput {
    pub delta: StateDelta,
    /// Set on the tick a side reaches the winning score.
    pub game_over: Option<GameOver>,
}

/// A read-only view of a session for listings and admin tools.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub status: MatchStatus,
    pub left: Option<PlayerSummary>,
    pub right: Option<PlayerSummary>,
    pub spectators: usize,
    pub score: Score,
    pub winner: Option<Side>,
}

impl SessionSummary {
    /// Seats plus spectators.
    pub fn occupants(&self) -> usize {
        usize::from(self.left.is_some()) + usize::from(self.right.is_some()) + self.spectators
    }
}

// ---------------------------------------------------------------------------
// MatchSession
// ---------------------------------------------------------------------------

/// One match's authoritative state.
#[derive(Debug)]
pub struct MatchSession {
    id: SessionId,
    config: MatchConfig,
    status: MatchStatus,
    left: Option<Seat>,
    right: Option<Seat>,
    spectators: HashSet<ConnectionId>,
    ball: Ball,
    paddles: Paddles,
    score: Score,
    winner: Option<Side>,
    last_tick: Instant,
}

impl MatchSession {
    /// Creates a waiting session with the ball served from the center.
    pub fn new(id: SessionId, config: MatchConfig) -> Self {
        let mut session = Self {
            id,
            config,
            status: MatchStatus::Waiting,
            left: None,
            right: None,
            spectators: HashSet::new(),
            ball: Ball::default(),
            paddles: Paddles::default(),
            score: Score::default(),
            winner: None,
            last_tick: Instant::now(),
        };
        session.serve();
        session
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn status(&self) -> MatchStatus {
        self.status
    }

    pub fn ball(&self) -> Ball {
        self.ball
    }

    pub fn paddles(&self) -> Paddles {
        self.paddles
    }

    pub fn score(&self) -> Score {
        self.score
    }

    pub fn winner(&self) -> Option<Side> {
        self.winner
    }

    pub fn seat(&self, side: Side) -> Option<&Seat> {
        match side {
            Side::Left => self.left.as_ref(),
            Side::Right => self.right.as_ref(),
        }
    }

    fn seat_mut(&mut self, side: Side) -> &mut Option<Seat> {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    pub fn spectator_count(&self) -> usize {
        self.spectators.len()
    }

    /// Seats plus spectators.
    pub fn occupant_count(&self) -> usize {
        usize::from(self.left.is_some()) + usize::from(self.right.is_some()) + self.spectators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occupant_count() == 0
    }

    /// `true` once both seats are filled.
    pub fn can_start(&self) -> bool {
        self.left.is_some() && self.right.is_some()
    }

    /// The role a connection holds here, if any.
    pub fn role_of(&self, conn: ConnectionId) -> Option<Role> {
        if self.left.as_ref().is_some_and(|s| s.conn == conn) {
            Some(Role::Left)
        } else if self.right.as_ref().is_some_and(|s| s.conn == conn) {
            Some(Role::Right)
        } else if self.spectators.contains(&conn) {
            Some(Role::Spectator)
        } else {
            None
        }
    }

    /// Replaces the ball state. Scores and status are untouched.
    pub fn place_ball(&mut self, ball: Ball) {
        self.ball = ball;
    }

    /// The current snapshot, as broadcast to clients.
    pub fn snapshot(&self) -> StateDelta {
        StateDelta {
            ball: self.ball.position(),
            paddles: self.paddles,
            score: self.score,
            winner: self.winner,
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            status: self.status,
            left: self.left.as_ref().map(|s| s.identity.summary()),
            right: self.right.as_ref().map(|s| s.identity.summary()),
            spectators: self.spectators.len(),
            score: self.score,
            winner: self.winner,
        }
    }

    // -- Seating ------------------------------------------------------------

    /// Seats a connection: left first, then right, otherwise spectator.
    ///
    /// Filling the second seat of a waiting session starts the match.
    ///
    /// # Errors
    /// `DuplicateParticipant` if `identity` already holds a seat here.
    /// The session is left unchanged.
    pub fn join(
        &mut self,
        conn: ConnectionId,
        identity: Identity,
    ) -> Result<JoinOutcome, MatchError> {
        let seated = [&self.left, &self.right]
            .into_iter()
            .flatten()
            .any(|seat| seat.identity.id == identity.id);
        if seated {
            return Err(MatchError::DuplicateParticipant {
                session: self.id,
                user: identity.id,
            });
        }

        let free_side = match self.status {
            MatchStatus::Waiting if self.left.is_none() => Some(Side::Left),
            MatchStatus::Waiting if self.right.is_none() => Some(Side::Right),
            _ => None,
        };

        let Some(side) = free_side else {
            self.spectators.insert(conn);
            return Ok(JoinOutcome {
                role: Role::Spectator,
                started: None,
            });
        };

        *self.seat_mut(side) = Some(Seat { conn, identity });

        let started = match (&self.left, &self.right) {
            (Some(left), Some(right)) => {
                let start = MatchStart {
                    left: left.identity.summary(),
                    right: right.identity.summary(),
                };
                self.status = MatchStatus::Active;
                self.last_tick = Instant::now();
                Some(start)
            }
            _ => None,
        };

        Ok(JoinOutcome {
            role: side.into(),
            started,
        })
    }

    /// Removes a connection from its seat or from the spectators.
    ///
    /// A seat emptied during an active match ends it: the player still
    /// seated wins by forfeit, or the match is abandoned if nobody is.
    pub fn leave(&mut self, conn: ConnectionId) -> LeaveOutcome {
        let Some(role) = self.role_of(conn) else {
            return LeaveOutcome::default();
        };

        let Some(side) = role.side() else {
            self.spectators.remove(&conn);
            return LeaveOutcome {
                role: Some(role),
                game_over: None,
            };
        };

        *self.seat_mut(side) = None;

        let game_over = if self.status.is_active() {
            self.status = MatchStatus::Finished;
            let remaining = side.opponent();
            let survivor = self.seat(remaining).map(|seat| seat.identity.summary());
            Some(match survivor {
                Some(summary) => {
                    self.winner = Some(remaining);
                    GameOver {
                        winner: GameWinner::Player(summary),
                        reason: FinishReason::Forfeit,
                    }
                }
                None => GameOver {
                    winner: GameWinner::Nobody,
                    reason: FinishReason::Abandoned,
                },
            })
        } else {
            None
        };

        LeaveOutcome {
            role: Some(role),
            game_over,
        }
    }

    /// Ends the session from outside play, e.g. when it is deleted.
    ///
    /// Only an active match produces a game over; waiting and finished
    /// sessions are just marked finished.
    pub fn abandon(&mut self) -> Option<GameOver> {
        let was_active = self.status.is_active();
        self.status = MatchStatus::Finished;
        was_active.then_some(GameOver {
            winner: GameWinner::Nobody,
            reason: FinishReason::Abandoned,
        })
    }

    /// Moves a paddle. `y` is the client's normalized position in
    /// `[-1, 1]`; it is clamped, then scaled to playfield units.
    ///
    /// Returns `false` (and changes nothing) for spectators, non-finite
    /// input, or a session that is not active.
    pub fn set_paddle(&mut self, role: Role, y: f64) -> bool {
        let Some(side) = role.side() else {
            return false;
        };
        if !self.status.is_active() || !y.is_finite() {
            return false;
        }
        self.paddles
            .set(side, y.clamp(-1.0, 1.0) * self.config.paddle_travel);
        true
    }

    // -- Simulation ---------------------------------------------------------

    /// Advances by the wall-clock time since the previous tick.
    pub fn tick(&mut self, now: Instant) -> Option<TickOutput> {
        if !self.status.is_active() {
            return None;
        }
        let dt = now.saturating_duration_since(self.last_tick).as_secs_f64();
        self.last_tick = now;
        self.advance(dt)
    }

    /// Integrates the ball by `dt` seconds and applies bounces, scoring,
    /// and the win check. A no-op returning `None` unless active.
    pub fn advance(&mut self, dt: f64) -> Option<TickOutput> {
        if !self.status.is_active() {
            return None;
        }
        let cfg = &self.config;
        let ball = &mut self.ball;

        ball.x += ball.vx * dt;
        ball.y += ball.vy * dt;

        if (ball.y > cfg.wall_y && ball.vy > 0.0) || (ball.y < -cfg.wall_y && ball.vy < 0.0) {
            ball.vy = -ball.vy;
        }

        if ball.x < -cfg.paddle_x
            && ball.vx < 0.0
            && (ball.y - self.paddles.left).abs() < cfg.paddle_reach
        {
            ball.vx = ball.vx.abs() * cfg.rally_speedup;
        } else if ball.x > cfg.paddle_x
            && ball.vx > 0.0
            && (ball.y - self.paddles.right).abs() < cfg.paddle_reach
        {
            ball.vx = -ball.vx.abs() * cfg.rally_speedup;
        }

        let scorer = if ball.x < -cfg.goal_x {
            Some(Side::Right)
        } else if ball.x > cfg.goal_x {
            Some(Side::Left)
        } else {
            None
        };

        let mut game_over = None;
        if let Some(side) = scorer {
            self.score.credit(side);
            self.serve();
            if self.score.get(side) >= self.config.winning_score {
                self.status = MatchStatus::Finished;
                self.winner = Some(side);
                game_over = Some(GameOver {
                    winner: self
                        .seat(side)
                        .map(|seat| GameWinner::Player(seat.identity.summary()))
                        .unwrap_or(GameWinner::Nobody),
                    reason: FinishReason::Score,
                });
            }
        }

        Some(TickOutput {
            delta: self.snapshot(),
            game_over,
        })
    }

    /// Recenters the ball with a random horizontal direction and a small
    /// random vertical component.
    fn serve(&mut self) {
        let mut rng = rand::rng();
        let speed = self.config.serve_speed;
        let half_spin = self.config.serve_spin / 2.0;

        let vx = if rng.random_bool(0.5) { speed } else { -speed };
        let vy = if half_spin > 0.0 {
            rng.random_range(-half_spin..half_spin)
        } else {
            0.0
        };

        self.ball = Ball {
            x: 0.0,
            y: 0.0,
            vx,
            vy,
        };
    }
}
