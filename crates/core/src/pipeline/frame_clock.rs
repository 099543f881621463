use std::time::{Duration, Instant};

use crate::shared::constants::DEFAULT_REFRESH_HZ;

/// Paces the render loop to the display refresh.
pub trait FrameClock {
    /// Blocks until the next refresh is due.
    fn wait_for_next_refresh(&mut self);
}

/// Sleeps to a fixed refresh rate.
///
/// A late tick moves the schedule forward instead of producing a burst of
/// back-to-back ticks to catch up.
pub struct IntervalClock {
    interval: Duration,
    next: Option<Instant>,
}

impl IntervalClock {
    /// Rates that are not positive, or too slow to express as a
    /// `Duration`, fall back to [`DEFAULT_REFRESH_HZ`].
    pub fn new(hz: f64) -> Self {
        let interval = Some(hz)
            .filter(|hz| hz.is_finite() && *hz > 0.0)
            .and_then(|hz| Duration::try_from_secs_f64(1.0 / hz).ok())
            .unwrap_or_else(|| Duration::from_secs_f64(1.0 / DEFAULT_REFRESH_HZ));
        Self {
            interval,
            next: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for IntervalClock {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_HZ)
    }
}

impl FrameClock for IntervalClock {
    fn wait_for_next_refresh(&mut self) {
        let now = Instant::now();
        let due = self.next.unwrap_or(now + self.interval);
        if due > now {
            std::thread::sleep(due - now);
            self.next = Some(due + self.interval);
        } else {
            self.next = Some(now + self.interval);
        }
    }
}
