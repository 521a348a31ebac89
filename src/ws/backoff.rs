//! Reconnection backoff policy.

use std::time::Duration;

/// Configuration for reconnect backoff.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Maximum number of reconnect attempts before the supervisor gives up.
    pub max_attempts: u32,
    /// Delay before the first reconnect attempt.
    pub base_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Maximum delay after the feed closed with a rate-limit code (1008).
    pub rate_limited_max_delay: Duration,
    /// Multiplier applied to the delay after each attempt.
    pub backoff_factor: f64,
    /// Whether to add jitter to the delay.
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            rate_limited_max_delay: Duration::from_secs(300),
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl BackoffConfig {
    /// Calculate the delay before reconnect attempt `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32, rate_limited: bool) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let base = self.base_delay.as_millis() as f64 * self.backoff_factor.powi(exp as i32);
        let cap = if rate_limited {
            self.rate_limited_max_delay
        } else {
            self.max_delay
        };
        let capped = base.min(cap.as_millis() as f64);

        let final_ms = if self.jitter {
            let jitter_range = capped * 0.25;
            let jitter = (rand::random::<f64>() - 0.5) * 2.0 * jitter_range;
            (capped + jitter).clamp(0.0, cap.as_millis() as f64)
        } else {
            capped
        };

        Duration::from_millis(final_ms as u64)
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}
