//! Match configuration.
//!
//! The playfield is centered on the origin. `x` runs between the two goal
//! lines, `y` between the two walls:
//!
//! ```text
//!  y = +wall_y  ───────────────────────────────────────
//!               |  left paddle             right paddle |
//!  x = -goal_x  |  (x = -paddle_x)  (0,0)  (x = +paddle_x)  x = +goal_x
//!               |                                        |
//!  y = -wall_y  ───────────────────────────────────────
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for every match created by an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// First side to reach this many points wins.
    pub winning_score: u32,

    /// How often an active session is ticked.
    pub tick_rate_hz: u32,

    /// Horizontal speed of a freshly served ball (units per second).
    pub serve_speed: f64,

    /// Width of the range the serve's vertical speed is drawn from,
    /// centered on zero.
    pub serve_spin: f64,

    /// Walls sit at `y = ±wall_y`.
    pub wall_y: f64,

    /// Paddles sit at `x = ±paddle_x`.
    pub paddle_x: f64,

    /// Half-height of a paddle: the ball is returned when it is closer
    /// than this to the paddle's center.
    pub paddle_reach: f64,

    /// Goal lines sit at `x = ±goal_x`.
    pub goal_x: f64,

    /// Factor applied to the horizontal speed on every paddle return.
    pub rally_speedup: f64,

    /// Client paddle input in `[-1, 1]` is scaled by this.
    pub paddle_travel: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            winning_score: 5,
            tick_rate_hz: 60,
            serve_speed: 3.0,
            serve_spin: 2.5,
            wall_y: 4.0,
            paddle_x: 3.5,
            paddle_reach: 1.2,
            goal_x: 6.0,
            rally_speedup: 1.1,
            paddle_travel: 4.0,
        }
    }
}

impl MatchConfig {
    /// Highest tick rate the ticker accepts.
    pub const MAX_TICK_RATE_HZ: u32 = 128;

    pub fn with_winning_score(mut self, winning_score: u32) -> Self {
        self.winning_score = winning_score;
        self
    }

    pub fn with_tick_rate(mut self, tick_rate_hz: u32) -> Self {
        self.tick_rate_hz = tick_rate_hz;
        self
    }

    /// Duration of one tick, with the rate clamped to `1..=MAX_TICK_RATE_HZ`.
    pub fn tick_period(&self) -> Duration {
        let rate = self.tick_rate_hz.clamp(1, Self::MAX_TICK_RATE_HZ);
        Duration::from_secs_f64(1.0 / f64::from(rate))
    }
}
