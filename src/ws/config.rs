#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use backoff::backoff::{Backoff, Constant};
use bon::Builder;

use crate::Result;
use crate::error::Error;

const DEFAULT_PING_PERIOD: Duration = Duration::from_secs(54);
const DEFAULT_PONG_WAIT: Duration = Duration::from_secs(60);
const DEFAULT_WRITE_WAIT: Duration = Duration::from_secs(10);
const DEFAULT_QUEUE_CAPACITY: usize = 5000;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Configuration for a client connection.
///
/// The heartbeat cadence must satisfy `ping_period < pong_wait` so that a PING is always on the
/// wire before the peer's liveness deadline fires.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Interval between liveness PINGs sent by the outbound pump
    #[builder(default = DEFAULT_PING_PERIOD)]
    pub ping_period: Duration,
    /// Window after the last received frame before the connection is considered dead
    #[builder(default = DEFAULT_PONG_WAIT)]
    pub pong_wait: Duration,
    /// Upper bound on a single transport write
    #[builder(default = DEFAULT_WRITE_WAIT)]
    pub write_wait: Duration,
    /// Capacity of both the outbound and the inbound queue
    #[builder(default = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
    /// How connection attempts are retried
    #[builder(default)]
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Config {
    /// Check the heartbeat invariants and queue sizing.
    pub fn validate(&self) -> Result<()> {
        if self.ping_period.is_zero() || self.pong_wait.is_zero() || self.write_wait.is_zero() {
            return Err(Error::validation("heartbeat durations must be non-zero"));
        }
        if self.ping_period >= self.pong_wait {
            return Err(Error::validation(format!(
                "ping period ({:?}) must be shorter than pong wait ({:?})",
                self.ping_period, self.pong_wait
            )));
        }
        if self.queue_capacity == 0 {
            return Err(Error::validation("queue capacity must be at least 1"));
        }

        Ok(())
    }
}

/// Delay schedule between connection attempts.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Same delay after every failure
    Fixed(Duration),
    /// Exponentially growing delay (with jitter), capped at `max`
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: f64,
    },
}

/// Retry policy for establishing a connection.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of failed attempts before giving up.
    /// `None` means infinite retries.
    pub max_attempts: Option<u32>,
    pub backoff: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RETRY_DELAY)
    }
}

impl RetryPolicy {
    /// Retry forever, sleeping `delay` after each failure.
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            backoff: BackoffStrategy::Fixed(delay),
        }
    }

    /// Retry forever with exponential backoff.
    #[must_use]
    pub const fn exponential(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts: None,
            backoff: BackoffStrategy::Exponential {
                initial,
                max,
                multiplier,
            },
        }
    }

    /// Give up after `attempts` failures.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Whether `failures` consecutive failures exhaust this policy.
    #[must_use]
    pub fn is_exhausted(&self, failures: u32) -> bool {
        self.max_attempts.is_some_and(|max| failures >= max)
    }

    /// Fresh delay schedule for one establishment run.
    #[must_use]
    pub fn schedule(&self) -> Box<dyn Backoff + Send> {
        match self.backoff {
            BackoffStrategy::Fixed(delay) => Box::new(Constant::new(delay)),
            BackoffStrategy::Exponential {
                initial,
                max,
                multiplier,
            } => Box::new(
                ExponentialBackoffBuilder::default()
                    .with_initial_interval(initial)
                    .with_max_interval(max)
                    .with_multiplier(multiplier)
                    .with_max_elapsed_time(None) // We handle max attempts separately
                    .build(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Kind;

    #[test]
    fn defaults_match_heartbeat_cadence() {
        let config = Config::default();

        assert_eq!(config.ping_period, Duration::from_secs(54));
        assert_eq!(config.pong_wait, Duration::from_secs(60));
        assert_eq!(config.write_wait, Duration::from_secs(10));
        assert_eq!(config.queue_capacity, 5000);
        assert_eq!(config.retry, RetryPolicy::fixed(Duration::from_secs(3)));
        config.validate().unwrap();
    }

    #[test]
    fn ping_period_must_be_shorter_than_pong_wait() {
        let config = Config::builder()
            .ping_period(Duration::from_secs(60))
            .pong_wait(Duration::from_secs(60))
            .build();

        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), Kind::Validation);
    }

    #[test]
    fn zero_queue_capacity_is_rejected() {
        let config = Config::builder().queue_capacity(0).build();

        assert!(config.validate().is_err());
    }

    #[test]
    fn fixed_schedule_never_ends() {
        let mut schedule = RetryPolicy::default().schedule();

        for _ in 0..100 {
            assert_eq!(schedule.next_backoff(), Some(Duration::from_secs(3)));
        }
    }

    #[test]
    fn exponential_schedule_respects_max() {
        let policy =
            RetryPolicy::exponential(Duration::from_secs(1), Duration::from_secs(2), 3.0);
        let mut schedule = policy.schedule();

        for _ in 0..10 {
            let _next = schedule.next_backoff();
        }

        // Capped at max plus jitter
        let duration = schedule.next_backoff().unwrap();
        assert!(duration <= Duration::from_secs(3));
    }

    #[test]
    fn bounded_policy_is_exhausted_after_max_attempts() {
        let policy = RetryPolicy::default().with_max_attempts(2);

        assert!(!policy.is_exhausted(1));
        assert!(policy.is_exhausted(2));
        assert!(!RetryPolicy::default().is_exhausted(u32::MAX));
    }
}
