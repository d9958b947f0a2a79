//! Resubscription backoff for transient provider errors

use std::time::Duration;

use rand::Rng;

/// Default first retry delay.
pub const DEFAULT_BASE: Duration = Duration::from_secs(1);

/// Default retry delay cap.
pub const DEFAULT_MAX: Duration = Duration::from_secs(60);

/// Default jitter as a fraction of the nominal delay (±20%).
pub const DEFAULT_JITTER: f64 = 0.2;

/// Exponential backoff with symmetric jitter.
///
/// The nominal delay for attempt `n` (1-indexed) is `base * 2^(n-1)`, capped at
/// `max`. Jitter scales it by a random factor in `[1 - jitter, 1 + jitter]`
/// and the result is clamped to `max` again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE,
            max: DEFAULT_MAX,
            jitter: DEFAULT_JITTER,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max,
            jitter: sanitize_jitter(jitter),
        }
    }

    /// Delay for `attempt` without jitter.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        // 2^(attempt-1), capped to avoid overflow.
        let exponent = attempt.saturating_sub(1);
        let multiplier: u32 = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.base.saturating_mul(multiplier).min(self.max)
    }

    /// Delay for `attempt` with jitter drawn from `rng`.
    pub fn delay_with<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let nominal = self.nominal_delay(attempt);
        let jitter = sanitize_jitter(self.jitter);
        if jitter == 0.0 {
            return nominal;
        }
        let factor = 1.0 + rng.gen_range(-jitter..=jitter);
        nominal.mul_f64(factor).min(self.max)
    }

    /// Delay for `attempt` using the thread-local RNG.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::thread_rng())
    }
}

/// Jitter as a fraction in `[0, 1]`; NaN and infinities mean no jitter.
fn sanitize_jitter(jitter: f64) -> f64 {
    if jitter.is_finite() {
        jitter.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
