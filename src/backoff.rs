//! Poll delay after failed iterations

use std::time::Duration;

/// Exponential backoff over the poll interval.
///
/// With no failures the delay is the poll interval. Each consecutive failure
/// doubles it, up to `max_backoff`.
#[derive(Debug, Clone)]
pub struct PollBackoff {
    poll_interval: Duration,
    max_backoff: Duration,
}

const MULTIPLIER: f64 = 2.0;

impl PollBackoff {
    pub fn new(poll_interval: Duration, max_backoff: Duration) -> Self {
        Self {
            poll_interval,
            max_backoff: max_backoff.max(poll_interval),
        }
    }

    /// Delay before the next iteration after `consecutive_failures` failed ones
    pub fn delay_after(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return self.poll_interval;
        }
        let exponent = (consecutive_failures - 1).min(32) as i32;
        let secs = self.poll_interval.as_secs_f64() * MULTIPLIER.powi(exponent);
        let capped = secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped).max(self.poll_interval)
    }
}
