//! Messages of the game channel (`/ws/<session-id>`).
//!
//! All messages are internally tagged JSON objects: `{"type": "...", ...}`.
//! Tag names are camelCase because that is what the browser client
//! already speaks.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{PlayerSummary, Role, Side};

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// What a seated client can send during a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GameClientMessage {
    /// Paddle position in normalized units, `-1.0` (bottom) to `1.0` (top).
    /// Out-of-range values are clamped by the engine.
    #[serde(rename = "paddleMove")]
    PaddleMove { y: f64 },
}

// ---------------------------------------------------------------------------
// Snapshot pieces
// ---------------------------------------------------------------------------

/// Ball position as sent to clients (velocity stays server-side).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BallPosition {
    pub x: f64,
    pub y: f64,
}

/// Vertical paddle positions in playfield units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Paddles {
    pub left: f64,
    pub right: f64,
}

impl Paddles {
    pub fn get(&self, side: Side) -> f64 {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    pub fn set(&mut self, side: Side, y: f64) {
        match side {
            Side::Left => self.left = y,
            Side::Right => self.right = y,
        }
    }
}

/// Points per side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Score {
    pub left: u32,
    pub right: u32,
}

impl Score {
    pub fn get(&self, side: Side) -> u32 {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    pub fn credit(&mut self, side: Side) {
        match side {
            Side::Left => self.left += 1,
            Side::Right => self.right += 1,
        }
    }
}

/// The per-tick snapshot broadcast to everyone watching a match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    pub ball: BallPosition,
    pub paddles: Paddles,
    pub score: Score,
    /// Set on the tick that ends the match.
    pub winner: Option<Side>,
}

// ---------------------------------------------------------------------------
// Game over
// ---------------------------------------------------------------------------

/// Why a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    /// A side reached the winning score.
    Score,
    /// A seated player left an active match; the other one wins.
    Forfeit,
    /// Nobody was left seated to award the match to.
    Abandoned,
}

/// The `winner` field of `gameOver`: the winning player, or the literal
/// string `"forfeit"` when there is nobody to award the match to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameWinner {
    Player(PlayerSummary),
    Nobody,
}

const NO_WINNER: &str = "forfeit";

impl Serialize for GameWinner {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Player(player) => player.serialize(serializer),
            Self::Nobody => serializer.serialize_str(NO_WINNER),
        }
    }
}

impl<'de> Deserialize<'de> for GameWinner {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Player(PlayerSummary),
            Label(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Player(player) => Ok(Self::Player(player)),
            Raw::Label(label) if label == NO_WINNER => Ok(Self::Nobody),
            Raw::Label(label) => Err(serde::de::Error::custom(format!(
                "unexpected winner label {label:?}"
            ))),
        }
    }
}

/// The outcome of a finished match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOver {
    pub winner: GameWinner,
    pub reason: FinishReason,
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Everything the server sends on the game channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GameServerMessage {
    /// Sent once to the joining connection.
    #[serde(rename = "assign")]
    Assign { role: Role },

    /// Broadcast when both seats are filled and play begins.
    #[serde(rename = "gameStart")]
    GameStart {
        left: PlayerSummary,
        right: PlayerSummary,
    },

    /// Broadcast every tick while the match is active.
    #[serde(rename = "state")]
    State(StateDelta),

    /// Broadcast once when the match ends.
    #[serde(rename = "gameOver")]
    GameOver(GameOver),
}
