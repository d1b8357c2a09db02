use std::time::Duration;

use rand::Rng;

/// How a single attempt's HTTP status affects the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// `[200, 400)`: delivered
    Success,
    /// `[400, 500)`: the request itself is rejected, resending cannot help
    Permanent,
    /// `>= 500`: transient on the receiver's side
    Retryable,
}

/// Retry strategy for webhook delivery
/// Failed attempts are retried with exponentially increasing, jittered delays.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryStrategy {
    max_attempts: u32,

    initial_interval: Duration,

    max_interval: Duration,

    jitter_factor: f64,
}

impl RetryStrategy {
    /// Create a new retry strategy without jitter
    pub fn new(max_attempts: u32, initial_interval: Duration, max_interval: Duration) -> Self {
        Self {
            max_attempts,
            initial_interval,
            max_interval,
            jitter_factor: 0.0,
        }
    }

    /// Create default retry strategy: 3 attempts, 1s doubling to 30s, ±25% jitter
    pub fn default_strategy() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(30)).with_jitter(0.25)
    }

    /// Set the jitter factor, clamped to `[0, 1]`
    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = if jitter_factor.is_finite() {
            jitter_factor.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// Get maximum number of attempts, the first one included
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    /// Classify an HTTP status code
    pub fn classify(status_code: u16) -> StatusClass {
        match status_code {
            400..=499 => StatusClass::Permanent,
            500..=u16::MAX => StatusClass::Retryable,
            _ => StatusClass::Success,
        }
    }

    /// Check if we may attempt again after `completed_attempts` attempts
    pub fn should_retry(&self, completed_attempts: u32) -> bool {
        completed_attempts < self.max_attempts
    }

    /// Delay to wait after `completed_attempts` failed attempts, or `None` once the
    /// attempt budget is spent.
    pub fn next_delay(&self, completed_attempts: u32) -> Option<Duration> {
        if completed_attempts == 0 || !self.should_retry(completed_attempts) {
            return None;
        }

        let base = self.base_delay(completed_attempts);
        Some(self.apply_jitter(base).min(self.max_interval))
    }

    /// Un-jittered delay: `initial * 2^(completed - 1)`, capped at the max interval
    pub fn base_delay(&self, completed_attempts: u32) -> Duration {
        let exponent = completed_attempts.saturating_sub(1).min(31);
        let multiplier = 2_u32.saturating_pow(exponent);

        self.initial_interval
            .checked_mul(multiplier)
            .unwrap_or(self.max_interval)
            .min(self.max_interval)
    }

    /// Randomize by ±jitter_factor to keep many clients from retrying in lockstep
    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.jitter_factor <= 0.0 || delay.is_zero() {
            return delay;
        }

        let range = delay.as_secs_f64() * self.jitter_factor;
        let offset = rand::rng().random_range(-range..=range);

        Duration::from_secs_f64((delay.as_secs_f64() + offset).max(0.0))
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::default_strategy()
    }
}
