//! # Backoff
//!
//! Exponential backoff driver for the supervisor loop.
//! The n-th delay is `initial_delay * base^n` plus up to one second of jitter.

use std::time::Duration;

use crate::domain::config::SupervisorConfig;
use crate::domain::error::BotError;

/// Longest wait ever returned, however large the computed delay gets.
pub const MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Source of jitter in seconds, expected in `[0, 1)`.
pub type JitterSource = Box<dyn FnMut() -> f64 + Send>;

pub struct Backoff {
    initial_delay: f64,
    base: f64,
    max_attempts: u32,
    attempts: u32,
    jitter: JitterSource,
}

impl Backoff {
    pub fn new(initial_delay: f64, base: f64, max_attempts: u32) -> Self {
        Self {
            initial_delay,
            base,
            max_attempts,
            attempts: 0,
            jitter: Box::new(rand::random::<f64>),
        }
    }

    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self::new(config.initial_delay, config.base, config.max_attempts)
    }

    /// Replace the random jitter with a custom source (deterministic in tests).
    pub fn with_jitter(mut self, jitter: impl FnMut() -> f64 + Send + 'static) -> Self {
        self.jitter = Box::new(jitter);
        self
    }

    /// Returns the next wait time, or `RetryLimitExceeded` once every attempt is used up.
    pub fn next(&mut self) -> Result<Duration, BotError> {
        if self.attempts >= self.max_attempts {
            return Err(BotError::RetryLimitExceeded {
                max_attempts: self.max_attempts,
            });
        }
        let jitter = (self.jitter)().clamp(0.0, 1.0);
        let delay = self.initial_delay * self.base.powi(self.attempts as i32) + jitter;
        self.attempts += 1;
        if delay.is_nan() || delay <= 0.0 {
            return Ok(Duration::ZERO);
        }
        Ok(Duration::try_from_secs_f64(delay).map_or(MAX_DELAY, |d| d.min(MAX_DELAY)))
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl std::fmt::Debug for Backoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backoff")
            .field("initial_delay", &self.initial_delay)
            .field("base", &self.base)
            .field("max_attempts", &self.max_attempts)
            .field("attempts", &self.attempts)
            .finish()
    }
}
