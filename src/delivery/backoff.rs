//! Exponential backoff for retrying transiently failed deliveries

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

/// Retry policy applied by the queue when a job fails transiently
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Failed attempts after which a job is dead-lettered
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential growth
    pub multiplier: f64,
    /// Fraction of the delay that may be shaved off at random (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300), // 5 minutes
            multiplier: 2.0,
            jitter_factor: 0.2, // 20% jitter
        }
    }
}

impl RetryPolicy {
    /// Whether a job with `attempt` failures has used up its budget
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }

    /// Delay before retry number `attempt` (1-based).
    ///
    /// Jitter only ever shortens the delay, so the result never exceeds `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let base_delay = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped_delay = base_delay.min(self.max_delay.as_millis() as f64);

        let jitter_factor = self.jitter_factor.clamp(0.0, 1.0);
        let final_delay = if jitter_factor > 0.0 {
            let reduction = capped_delay * jitter_factor * rand::rng().random_range(0.0..1.0);
            capped_delay - reduction
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay.max(1.0) as u64)
    }

    /// Compute the next eligible time for retry number `attempt`.
    ///
    /// The result is always strictly later than `previous`.
    pub fn next_attempt_at(
        &self,
        attempt: u32,
        now: DateTime<Utc>,
        previous: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let delay = chrono::Duration::from_std(self.delay_for(attempt))
            .unwrap_or_else(|_| chrono::Duration::milliseconds(self.max_delay.as_millis() as i64));
        let candidate = now + delay;
        let floor = previous + chrono::Duration::milliseconds(1);
        candidate.max(floor)
    }
}
