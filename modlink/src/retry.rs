use std::time::Duration;

/// Controls the delay between failed connect (TCP) or open (serial) attempts
pub trait RetryStrategy: Send {
    /// Reset internal state. Called when a connection is established or a port is opened
    fn reset(&mut self);
    /// Return the delay before making another connect/open attempt
    fn after_failed_connect(&mut self) -> Duration;
}

/// Return the default [`RetryStrategy`]: 1s, 2s, 4s, ... capped at 60s
pub fn default_retry_strategy() -> Box<dyn RetryStrategy> {
    doubling_retry_strategy(Duration::from_secs(1), Duration::from_secs(60))
}

/// Return a [`RetryStrategy`] that doubles on failure up to a maximum value
pub fn doubling_retry_strategy(min: Duration, max: Duration) -> Box<dyn RetryStrategy> {
    Box::new(Doubling::new(min, max))
}

struct Doubling {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Doubling {
    fn new(min: Duration, max: Duration) -> Self {
        Doubling {
            min,
            max: std::cmp::max(min, max),
            current: min,
        }
    }
}

impl RetryStrategy for Doubling {
    fn reset(&mut self) {
        self.current = self.min;
    }

    fn after_failed_connect(&mut self) -> Duration {
        let ret = self.current;
        self.current = std::cmp::min(self.current.saturating_mul(2), self.max);
        ret
    }
}
