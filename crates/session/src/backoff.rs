//! Reconnect delay policy: strategy curves, clamping, and jitter.
//!
//! The pure computation lives here so the session actor only ever asks
//! "how long until attempt N". Jitter is a signed offset in
//! `[-jitter, +jitter]` derived from a multiplicative hash of
//! `(seed, attempt)`, deterministic for a fixed seed, so tests can pin
//! exact delays. Not cryptographically random; just enough to spread
//! reconnect storms.

use std::time::Duration;

use tg_domain::config::{BackoffConfig, BackoffStrategy};

/// Default floor applied to reconnect delays so a misconfigured policy can
/// never produce a hot reconnect loop.
pub const DEFAULT_RECONNECT_FLOOR: Duration = Duration::from_millis(1_000);

/// Controls how an endpoint session schedules reconnect attempts.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub strategy: BackoffStrategy,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Jitter amplitude. Zero disables jitter.
    pub jitter: Duration,
    /// Consecutive failed attempts before the session gives up.
    pub max_attempts: u32,
    /// Minimum delay for the reconnect path (see [`Self::reconnect_delay`]).
    pub reconnect_floor: Duration,
    /// Seed mixed into the jitter hash.
    pub seed: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}

impl BackoffPolicy {
    pub fn from_config(cfg: &BackoffConfig) -> Self {
        Self {
            strategy: cfg.strategy,
            initial_delay: Duration::from_millis(cfg.initial_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            multiplier: cfg.multiplier,
            jitter: Duration::from_millis(cfg.jitter_ms),
            max_attempts: cfg.max_attempts,
            reconnect_floor: DEFAULT_RECONNECT_FLOOR,
            seed: 0,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Pre-jitter delay for the given attempt (1-indexed), clamped to
    /// `[0, max_delay]`. Monotonically non-decreasing in `attempt` for the
    /// exponential strategy (multiplier >= 1).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let ms = match self.strategy {
            BackoffStrategy::Immediate => 0.0,
            BackoffStrategy::Fixed => self.initial_delay.as_millis() as f64,
            BackoffStrategy::Linear => {
                self.initial_delay.as_millis() as f64 + attempt as f64 * self.multiplier * 1_000.0
            }
            BackoffStrategy::Exponential => {
                self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32 - 1)
            }
        };
        let capped = ms.min(self.max_delay.as_millis() as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Jittered delay for the given attempt, floored at zero.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.jittered(attempt, Duration::ZERO)
    }

    /// Jittered delay for the reconnect path, floored at
    /// [`reconnect_floor`](Self::reconnect_floor) so even the immediate
    /// strategy leaves breathing room between attempts.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        self.jittered(attempt, self.reconnect_floor)
    }

    /// Whether the given consecutive-failure count exhausts the policy.
    pub fn should_give_up(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }

    fn jittered(&self, attempt: u32, floor: Duration) -> Duration {
        let base = self.base_delay(attempt).as_millis() as i64;
        let offset = if self.jitter.is_zero() {
            0
        } else {
            (self.jitter.as_millis() as f64 * signed_fraction(self.seed, attempt)) as i64
        };
        let ms = (base + offset).max(floor.as_millis() as i64).max(0);
        Duration::from_millis(ms as u64)
    }
}

/// Deterministic "random" fraction in [-1, 1) from (seed, attempt).
/// Knuth multiplicative hash with an extra mixing round.
fn signed_fraction(seed: u64, attempt: u32) -> f64 {
    let mut x = seed
        .wrapping_add(attempt as u64)
        .wrapping_mul(0x9E37_79B9_7F4A_7C15);
    x ^= x >> 33;
    x = x.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    x ^= x >> 33;
    (x as f64 / u64::MAX as f64) * 2.0 - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(strategy: BackoffStrategy) -> BackoffPolicy {
        BackoffPolicy {
            strategy,
            initial_delay: Duration::from_millis(5_000),
            max_delay: Duration::from_millis(60_000),
            multiplier: 2.0,
            jitter: Duration::ZERO,
            max_attempts: 10,
            reconnect_floor: DEFAULT_RECONNECT_FLOOR,
            seed: 0,
        }
    }

    #[test]
    fn immediate_is_zero() {
        let p = policy(BackoffStrategy::Immediate);
        assert_eq!(p.base_delay(1), Duration::ZERO);
        assert_eq!(p.base_delay(7), Duration::ZERO);
    }

    #[test]
    fn fixed_is_initial_delay() {
        let p = policy(BackoffStrategy::Fixed);
        assert_eq!(p.base_delay(1), Duration::from_millis(5_000));
        assert_eq!(p.base_delay(9), Duration::from_millis(5_000));
    }

    #[test]
    fn linear_grows_by_multiplier_seconds() {
        let p = policy(BackoffStrategy::Linear);
        assert_eq!(p.base_delay(1), Duration::from_millis(7_000));
        assert_eq!(p.base_delay(2), Duration::from_millis(9_000));
        assert_eq!(p.base_delay(3), Duration::from_millis(11_000));
    }

    #[test]
    fn exponential_doubles_from_initial() {
        let p = policy(BackoffStrategy::Exponential);
        assert_eq!(p.base_delay(1), Duration::from_millis(5_000));
        assert_eq!(p.base_delay(2), Duration::from_millis(10_000));
        assert_eq!(p.base_delay(3), Duration::from_millis(20_000));
        assert_eq!(p.base_delay(4), Duration::from_millis(40_000));
    }

    #[test]
    fn delay_always_within_zero_and_max() {
        for strategy in [
            BackoffStrategy::Immediate,
            BackoffStrategy::Fixed,
            BackoffStrategy::Linear,
            BackoffStrategy::Exponential,
        ] {
            let p = policy(strategy);
            for attempt in 1..=50 {
                let d = p.base_delay(attempt);
                assert!(d <= p.max_delay, "{strategy:?} attempt {attempt} over cap");
            }
        }
    }

    #[test]
    fn exponential_non_decreasing_pre_jitter() {
        let p = policy(BackoffStrategy::Exponential);
        let mut prev = Duration::ZERO;
        for attempt in 1..=30 {
            let d = p.base_delay(attempt);
            assert!(d >= prev, "decreased at attempt {attempt}");
            prev = d;
        }
    }

    #[test]
    fn jitter_is_deterministic_and_bounded() {
        let mut p = policy(BackoffStrategy::Fixed);
        p.jitter = Duration::from_millis(1_000);
        p.seed = 42;

        for attempt in 1..=20 {
            let a = p.delay_for_attempt(attempt);
            let b = p.delay_for_attempt(attempt);
            assert_eq!(a, b, "same seed must reproduce the same delay");

            let base = p.base_delay(attempt).as_millis() as i64;
            let got = a.as_millis() as i64;
            assert!((got - base).abs() <= 1_000, "jitter exceeded amplitude");
        }
    }

    #[test]
    fn different_seeds_spread_delays() {
        let mut a = policy(BackoffStrategy::Fixed);
        let mut b = policy(BackoffStrategy::Fixed);
        a.jitter = Duration::from_millis(1_000);
        b.jitter = Duration::from_millis(1_000);
        a.seed = 1;
        b.seed = 2;
        let differs = (1..=10).any(|n| a.delay_for_attempt(n) != b.delay_for_attempt(n));
        assert!(differs, "distinct seeds should produce distinct schedules");
    }

    #[test]
    fn zero_jitter_equals_base() {
        let p = policy(BackoffStrategy::Exponential);
        for attempt in 1..=10 {
            assert_eq!(p.delay_for_attempt(attempt), p.base_delay(attempt));
        }
    }

    #[test]
    fn reconnect_floor_applies_even_to_immediate() {
        let p = policy(BackoffStrategy::Immediate);
        assert_eq!(p.reconnect_delay(1), DEFAULT_RECONNECT_FLOOR);
        assert_eq!(p.delay_for_attempt(1), Duration::ZERO);
    }

    #[test]
    fn negative_jitter_never_goes_below_zero() {
        let mut p = policy(BackoffStrategy::Immediate);
        p.jitter = Duration::from_millis(5_000);
        for seed in 0..20 {
            p.seed = seed;
            for attempt in 1..=10 {
                // Would be negative without the floor; must clamp to zero.
                let _ = p.delay_for_attempt(attempt);
            }
        }
    }

    #[test]
    fn gives_up_at_max_attempts() {
        let p = policy(BackoffStrategy::Fixed);
        assert!(!p.should_give_up(9));
        assert!(p.should_give_up(10));
        assert!(p.should_give_up(11));
    }

    #[test]
    fn from_config_carries_defaults() {
        let p = BackoffPolicy::default();
        assert_eq!(p.strategy, BackoffStrategy::Exponential);
        assert_eq!(p.initial_delay, Duration::from_millis(5_000));
        assert_eq!(p.max_attempts, 10);
        // First delay after a successful open (attempt reset to 0) is the
        // attempt-1 value.
        assert_eq!(p.base_delay(1), p.initial_delay);
    }
}
