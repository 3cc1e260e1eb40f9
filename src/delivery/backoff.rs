//! Retry policy for queued stores: exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::DeliveryConfig;

/// How many times a worker tries to store a message and how long it waits
/// between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based; 0 means no delay).
    ///
    /// Doubles from `base_delay` up to `max_delay`, plus up to 10% jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let doubled = 1u32
            .checked_shl(attempt - 1)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(self.max_delay);
        let delay = doubled.min(self.max_delay);

        let spread = delay / 10;
        if spread.is_zero() {
            return delay;
        }
        delay + spread.mul_f64(rand::thread_rng().gen::<f64>())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&DeliveryConfig::default())
    }
}
