//! Reconnect backoff for the gateway connection.
//!
//! The gateway closes the connection on every rejected notification, so
//! reconnect attempts are routine rather than exceptional. Delays grow
//! exponentially from one second up to a cap, with jitter so a fleet of
//! clients does not stampede the gateway in lockstep.

use std::time::Duration;

use rand::Rng;

/// Backoff parameters for the reconnect loop.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the second connect attempt, in milliseconds.
    pub initial_delay_ms: u64,
    /// Ceiling for the delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Growth factor applied after each failed attempt.
    pub multiplier: f64,
    /// Jitter fraction (0.0 to 1.0) applied around the computed delay.
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// Stateful delay sequence for one reconnect episode. Reset after a
/// successful connect.
pub struct ExponentialBackoff {
    config: BackoffConfig,
    next_delay_ms: u64,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        let next_delay_ms = config.initial_delay_ms;
        Self {
            config,
            next_delay_ms,
            attempt: 0,
        }
    }

    /// Delay to sleep before the next connect attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt += 1;

        let base = self.next_delay_ms;
        let grown = (base as f64 * self.config.multiplier).min(self.config.max_delay_ms as f64);
        self.next_delay_ms = grown.max(1.0) as u64;

        let delay = if self.config.jitter_factor > 0.0 {
            let spread = base as f64 * self.config.jitter_factor;
            let jitter = rand::thread_rng().gen_range(-spread..=spread);
            (base as f64 + jitter).max(1.0) as u64
        } else {
            base
        };

        Duration::from_millis(delay)
    }

    /// Start over from the initial delay.
    pub fn reset(&mut self) {
        self.next_delay_ms = self.config.initial_delay_ms;
        self.attempt = 0;
    }

    /// Failed attempts since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}
