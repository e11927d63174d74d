//! Solver configuration.
//!
//! Timing constants here are tuning parameters copied from observed widget
//! behaviour, not correctness constants; everything is adjustable so tests
//! and unusual deployments can tighten or relax them.

use std::env;
use std::ops::RangeInclusive;
use std::time::Duration;

/// Environment variable consulted for the CapSolver credential when none is
/// configured explicitly.
pub const CAPSOLVER_API_KEY_ENV: &str = "CAPSOLVER_API_KEY";

#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Solve attempts per `solve()` call.
    pub attempts: u32,
    /// Interval between checks in every polling loop.
    pub poll_interval: Duration,
    /// Human-pacing delay before quick interactions, in milliseconds.
    pub short_delay_ms: RangeInclusive<u64>,
    /// Human-pacing delay before starting a challenge, in milliseconds.
    pub long_delay_ms: RangeInclusive<u64>,
    /// Wall-clock ceiling for waiting on a dynamically-refreshing tile.
    pub tile_settle_ceiling: Duration,
    /// How long to poll for the verification token after the round loop
    /// ends before giving up on the attempt.
    pub token_timeout: Duration,
    /// Default deadline for `wait`-mode widget discovery.
    pub wait_timeout: Duration,
    /// Default deadline for the v3 passive solver.
    pub solve_timeout: Duration,
    /// Image classification credential, if configured.
    pub capsolver_api_key: Option<String>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            poll_interval: Duration::from_millis(250),
            short_delay_ms: 150..=350,
            long_delay_ms: 1250..=1500,
            tile_settle_ceiling: Duration::from_secs(60),
            token_timeout: Duration::from_secs(30),
            wait_timeout: Duration::from_secs(30),
            solve_timeout: Duration::from_secs(30),
            capsolver_api_key: env::var(CAPSOLVER_API_KEY_ENV).ok(),
        }
    }
}

impl SolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_capsolver_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.capsolver_api_key = Some(api_key.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_token_timeout(mut self, timeout: Duration) -> Self {
        self.token_timeout = timeout;
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn with_solve_timeout(mut self, timeout: Duration) -> Self {
        self.solve_timeout = timeout;
        self
    }

    pub fn with_tile_settle_ceiling(mut self, ceiling: Duration) -> Self {
        self.tile_settle_ceiling = ceiling;
        self
    }

    pub fn with_short_delay_ms(mut self, range: RangeInclusive<u64>) -> Self {
        self.short_delay_ms = range;
        self
    }

    pub fn with_long_delay_ms(mut self, range: RangeInclusive<u64>) -> Self {
        self.long_delay_ms = range;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = SolverConfig::new()
            .with_attempts(2)
            .with_poll_interval(Duration::from_millis(5))
            .with_token_timeout(Duration::from_millis(50));

        assert_eq!(config.attempts, 2);
        assert_eq!(config.poll_interval, Duration::from_millis(5));
        assert_eq!(config.token_timeout, Duration::from_millis(50));
        assert_eq!(config.tile_settle_ceiling, Duration::from_secs(60));
    }
}
