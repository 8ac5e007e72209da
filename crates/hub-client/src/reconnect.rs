//! Reconnect policy with capped exponential back-off.

use std::time::Duration;

/// Default seed for the back-off formula.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(5_000);
/// Upper bound on any single reconnect delay.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_millis(30_000);
/// Default cap on consecutive automatic reconnect attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Controls how the hub client reconnects after a connection drop.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectBackoff {
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (cap).
    pub max_delay: Duration,
    /// Multiplier applied after each failed attempt.
    pub backoff_factor: f64,
    /// Maximum number of consecutive attempts before giving up.
    /// `0` disables automatic reconnection.
    pub max_attempts: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_RECONNECT_INTERVAL,
            max_delay: MAX_RECONNECT_DELAY,
            backoff_factor: 1.5,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectBackoff {
    /// Compute the delay for the given attempt number (1-indexed):
    /// `min(max_delay, initial_delay * factor^(attempt - 1))`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_ms * self.backoff_factor.powi(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms.round() as u64)
    }

    /// Whether `scheduled` attempts already reach the cap.
    pub fn should_give_up(&self, scheduled: u32) -> bool {
        scheduled >= self.max_attempts
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.initial_delay.is_zero() {
            return Err("reconnect interval must be greater than zero".into());
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(format!(
                "backoff factor must be a finite number >= 1, got {}",
                self.backoff_factor
            ));
        }
        if self.max_delay.is_zero() {
            return Err("max reconnect delay must be greater than zero".into());
        }
        Ok(())
    }
}
