//! Fixed-cadence pacing for a session's tick loop.
//!
//! The ticker only decides *when* to tick. Physics still integrates the
//! measured wall-clock delta, so a late tick moves the ball further
//! rather than running twice.
//!
//! ```ignore
//! let mut ticker = Ticker::new(config.tick_period());
//! loop {
//!     ticker.wait().await;
//!     match engine.tick(session_id).await { /* ... */ }
//! }
//! ```

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{trace, warn};

/// Information about one fired tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickInfo {
    /// Starts at 1.
    pub tick: u64,
    /// `true` if the tick fired more than 10% of a period late.
    pub overrun: bool,
    /// Whole periods skipped because of the overrun.
    pub ticks_skipped: u64,
}

/// Sleeps until each tick is due. When a tick fires late, the missed
/// periods are skipped and the next deadline is counted from now, so a
/// stalled loop never bursts to catch up.
#[derive(Debug)]
pub struct Ticker {
    period: Duration,
    next: Instant,
    tick_count: u64,
    total_overruns: u64,
}

impl Ticker {
    /// Periods below one millisecond are raised to one millisecond.
    pub fn new(period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        Self {
            period,
            next: Instant::now() + period,
            tick_count: 0,
            total_overruns: 0,
        }
    }

    pub async fn wait(&mut self) -> TickInfo {
        time::sleep_until(self.next).await;

        let now = Instant::now();
        self.tick_count += 1;

        let late_by = now.saturating_duration_since(self.next);
        let overrun = late_by > self.period / 10;
        let mut ticks_skipped = 0;

        if overrun {
            self.total_overruns += 1;
            ticks_skipped = (late_by.as_nanos() / self.period.as_nanos()) as u64;
            if ticks_skipped > 0 {
                warn!(
                    tick = self.tick_count,
                    skipped = ticks_skipped,
                    late_ms = late_by.as_secs_f64() * 1000.0,
                    "tick overrun, skipping ahead"
                );
            }
        }

        self.next = now + self.period;
        trace!(tick = self.tick_count, overrun, "tick fired");

        TickInfo {
            tick: self.tick_count,
            overrun,
            ticks_skipped,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn total_overruns(&self) -> u64 {
        self.total_overruns
    }
}
