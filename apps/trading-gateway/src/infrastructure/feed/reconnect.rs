//! Reconnection Policy
//!
//! Exponential backoff with jitter for the upstream feed. Reconnection is
//! only ever applied to the feed; trading mutations are never retried.

use std::time::Duration;

use rand::Rng;

use crate::infrastructure::config::FeedSettings;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay.
    pub max_delay: Duration,
    /// Growth factor applied after each attempt.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Maximum attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(64),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 0,
        }
    }
}

impl From<&FeedSettings> for ReconnectConfig {
    fn from(settings: &FeedSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_delay_initial,
            max_delay: settings.reconnect_delay_max,
            multiplier: settings.reconnect_delay_multiplier,
            max_attempts: settings.max_reconnect_attempts,
            ..Self::default()
        }
    }
}

/// Backoff state for one supervisor.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    base_delay: Duration,
    attempts: u32,
}

impl ReconnectPolicy {
    /// Create a policy at its initial delay.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            base_delay: config.initial_delay,
            config,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }
        self.attempts = self.attempts.saturating_add(1);

        let delay = self.jittered(self.base_delay);
        let grown = if self.config.multiplier.is_finite() && self.config.multiplier > 0.0 {
            scale(self.base_delay, self.config.multiplier).unwrap_or(self.config.max_delay)
        } else {
            self.base_delay
        };
        self.base_delay = grown.min(self.config.max_delay);

        Some(delay)
    }

    /// Return to the initial delay after a successful connection.
    pub const fn reset(&mut self) {
        self.base_delay = self.config.initial_delay;
        self.attempts = 0;
    }

    /// Attempts since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempts
    }

    /// Whether another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempts < self.config.max_attempts
    }

    fn jittered(&self, delay: Duration) -> Duration {
        let factor = self.config.jitter_factor;
        if factor <= 0.0 || delay.is_zero() {
            return delay;
        }
        scale(delay, factor_draw(factor))
            .unwrap_or(delay)
            .max(Duration::from_millis(1))
    }
}

fn factor_draw(jitter: f64) -> f64 {
    rand::rng().random_range((1.0 - jitter).max(0.0)..=(1.0 + jitter))
}

fn scale(delay: Duration, factor: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy::new(ReconnectConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts,
        })
    }

    #[test]
    fn defaults_match_gateway_backoff() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(64));
        assert_eq!(config.max_attempts, 0);
    }

    #[test]
    fn delays_grow_and_cap() {
        let mut policy = exact(0);
        let delays: Vec<u128> = (0..5)
            .map(|_| policy.next_delay().unwrap().as_millis())
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
    }

    #[test]
    fn attempts_are_bounded() {
        let mut policy = exact(2);
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_none());
        assert!(!policy.should_retry());

        policy.reset();
        assert_eq!(policy.attempt_count(), 0);
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn jitter_stays_within_band() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            initial_delay: Duration::from_millis(1000),
            jitter_factor: 0.1,
            ..ReconnectConfig::default()
        });
        let delay = policy.next_delay().unwrap();
        assert!(delay >= Duration::from_millis(900));
        assert!(delay <= Duration::from_millis(1100));
    }

    #[test]
    fn built_from_feed_settings() {
        let settings = FeedSettings {
            reconnect_delay_initial: Duration::from_millis(250),
            max_reconnect_attempts: 3,
            ..FeedSettings::default()
        };
        let config = ReconnectConfig::from(&settings);
        assert_eq!(config.initial_delay, Duration::from_millis(250));
        assert_eq!(config.max_attempts, 3);
        assert!((config.jitter_factor - 0.1).abs() < f64::EPSILON);
    }
}
