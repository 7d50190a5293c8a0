//! Reconnect scheduling.

use rand::Rng;
use std::time::Duration;

/// How the delay between reconnect attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Wait `interval` before every attempt.
    Fixed,
    /// Double the delay after each failed attempt, capped at `max_delay`.
    Exponential { max_delay: Duration },
}

/// Bounded reconnect policy.
///
/// After the connection is lost (or an attempt fails) the supervisor makes at
/// most `max_attempts` further attempts; the count resets whenever a
/// connection opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    pub backoff: Backoff,
    /// Draw each delay uniformly from `[delay / 2, delay]`.
    pub jitter: bool,
}

impl ReconnectPolicy {
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            backoff: Backoff::Fixed,
            jitter: false,
        }
    }

    pub fn exponential(max_attempts: u32, interval: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            backoff: Backoff::Exponential { max_delay },
            jitter: false,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Whether another attempt is allowed after `attempts_made` reconnects.
    pub fn allows(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Delay before reconnect `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = self.base_delay(attempt);
        if self.jitter {
            delay.mul_f64(rand::thread_rng().gen_range(0.5..=1.0))
        } else {
            delay
        }
    }

    fn base_delay(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential { max_delay } => {
                let exponent = attempt.saturating_sub(1).min(31) as i32;
                let delay = self.interval.as_secs_f64() * 2_f64.powi(exponent);
                Duration::from_secs_f64(delay.min(max_delay.as_secs_f64()))
            }
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(5, Duration::from_secs(3))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay_is_constant() {
        let policy = ReconnectPolicy::fixed(3, Duration::from_millis(500));

        assert_eq!(policy.delay(1), Duration::from_millis(500));
        assert_eq!(policy.delay(3), Duration::from_millis(500));
    }

    #[test]
    fn test_exponential_delay() {
        let policy =
            ReconnectPolicy::exponential(10, Duration::from_secs(1), Duration::from_secs(60));

        assert_eq!(policy.delay(1).as_secs(), 1);
        assert_eq!(policy.delay(2).as_secs(), 2);
        assert_eq!(policy.delay(3).as_secs(), 4);
    }

    #[test]
    fn test_max_delay_cap() {
        let policy =
            ReconnectPolicy::exponential(100, Duration::from_secs(1), Duration::from_secs(30));

        assert_eq!(policy.delay(10), Duration::from_secs(30));
        assert_eq!(policy.delay(100), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_within_half_to_full_delay() {
        let policy = ReconnectPolicy::fixed(5, Duration::from_secs(2)).with_jitter(true);

        for _ in 0..100 {
            let delay = policy.delay(1);
            assert!(delay >= Duration::from_secs(1), "{delay:?} below half");
            assert!(delay <= Duration::from_secs(2), "{delay:?} above full");
        }
    }

    #[test]
    fn test_attempt_cap() {
        let policy = ReconnectPolicy::fixed(2, Duration::from_secs(1));

        assert!(policy.allows(0));
        assert!(policy.allows(1));
        assert!(!policy.allows(2));
        assert!(!ReconnectPolicy::fixed(0, Duration::from_secs(1)).allows(0));
    }
}
