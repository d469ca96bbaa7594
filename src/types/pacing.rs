//! Sample pacing for the streaming loop

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};

/// Fixed pause between sampling ticks
pub const DEFAULT_SAMPLE_PAUSE: Duration = Duration::from_millis(5);

/// Timing policy for one streaming session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplePacing {
    /// Wall-clock length of the sampling loop
    pub duration: Duration,

    /// Minimum spacing between ticks
    pub pause: Duration,
}

impl SamplePacing {
    pub fn new(duration: Duration, pause: Duration) -> Self {
        Self { duration, pause }
    }

    /// Pacing for a duration given in whole seconds
    pub fn for_seconds(seconds: u64) -> Self {
        Self::new(Duration::from_secs(seconds), DEFAULT_SAMPLE_PAUSE)
    }

    /// Build the tick timer.
    ///
    /// The first tick completes immediately. A producer that overruns its slot
    /// delays the following ticks instead of causing a burst.
    pub fn ticker(&self) -> Interval {
        let mut ticker = interval(self.pause.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// Upper bound on ticks if the producer takes no time at all
    pub fn max_ticks(&self) -> u64 {
        let pause = self.pause.max(Duration::from_millis(1)).as_micros();
        self.duration.as_micros().div_ceil(pause) as u64
    }
}

impl Default for SamplePacing {
    fn default() -> Self {
        Self::for_seconds(2)
    }
}
