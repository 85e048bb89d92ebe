//! Backoff for the live-session retry loop.
//!
//! The delay starts at a floor, doubles on every failed attempt up to a
//! ceiling, and drops back to the floor as soon as a connection succeeds.

use std::time::Duration;

use crate::error::{Error, Result};

/// Options for the live retry backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffOptions {
    /// Delay after the first failure, and after any success.
    pub initial_delay: Duration,
    /// Upper bound on the delay.
    pub max_delay: Duration,
    /// Growth factor per failure.
    pub multiplier: f64,
}

impl Default for BackoffOptions {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
        }
    }
}

impl BackoffOptions {
    /// Create new backoff options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the floor delay.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the ceiling delay.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the growth factor.
    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Validate the options and return an error if invalid.
    ///
    /// Checks that:
    /// - `multiplier` is >= 1.0
    /// - `initial_delay` is > 0
    /// - `max_delay` >= `initial_delay`
    pub fn validate(&self) -> Result<()> {
        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            return Err(Error::InvalidConfig(
                "backoff multiplier must be >= 1.0".to_string(),
            ));
        }
        if self.initial_delay.is_zero() {
            return Err(Error::InvalidConfig(
                "initial backoff delay must be > 0".to_string(),
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err(Error::InvalidConfig(
                "max backoff delay must be >= initial delay".to_string(),
            ));
        }
        Ok(())
    }
}

/// Current retry delay of a live loop.
#[derive(Debug, Clone)]
pub struct Backoff {
    options: BackoffOptions,
    current: Duration,
}

impl Backoff {
    pub fn new(options: BackoffOptions) -> Self {
        let current = options.initial_delay;
        Self { options, current }
    }

    /// The delay the next failure will wait.
    #[must_use]
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Consume the current delay and grow it for the next failure.
    pub fn advance(&mut self) -> Duration {
        let delay = self.current;
        let grown = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.options.multiplier)
            .unwrap_or(self.options.max_delay);
        self.current = grown.min(self.options.max_delay);
        delay
    }

    /// Drop back to the floor after a successful connection.
    pub fn reset(&mut self) {
        self.current = self.options.initial_delay;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffOptions::default())
    }
}
