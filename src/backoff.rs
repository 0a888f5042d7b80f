//! Backoff policies for spacing out retry attempts.
//!
//! The jittered variants follow the "exponential backoff and jitter" family:
//! every strategy except [`BackoffKind::NoBackoff`] grows from `base` and is
//! capped at `cap`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;

use crate::RestCallError;

/// Strategy used to compute the sleep before a retry.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum BackoffKind {
    /// Constant `base` sleep.
    NoBackoff,
    /// `min(cap, base * 2^n)`.
    #[default]
    Exponential,
    /// Half of the exponential sleep plus a random half.
    EqualJitter,
    /// Uniform in `[0, exponential)`.
    FullJitter,
    /// Random walk driven by the previous sleep.
    DecorrelatedJitter,
}

impl BackoffKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoBackoff => "NoBackOff",
            Self::Exponential => "ExpoBackOff",
            Self::EqualJitter => "ExpoEqualJitter",
            Self::FullJitter => "ExpoFullyJitter",
            Self::DecorrelatedJitter => "ExpoDecorrJitter",
        }
    }
}

impl fmt::Display for BackoffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackoffKind {
    type Err = RestCallError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "nobackoff" | "no_backoff" | "none" | "constant" => Ok(Self::NoBackoff),
            "expobackoff" | "exponential" => Ok(Self::Exponential),
            "expoequaljitter" | "equal_jitter" => Ok(Self::EqualJitter),
            "expofullyjitter" | "full_jitter" => Ok(Self::FullJitter),
            "expodecorrjitter" | "decorrelated_jitter" => Ok(Self::DecorrelatedJitter),
            other => Err(RestCallError::Config(format!(
                "unknown backoff policy '{other}'"
            ))),
        }
    }
}

/// Immutable retry pacing configuration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BackoffPolicy {
    pub kind: BackoffKind,
    pub base: Duration,
    pub cap: Duration,
    /// Total attempts per call, the first one included.
    pub max_attempts: usize,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

impl BackoffPolicy {
    pub fn new(kind: BackoffKind, base: Duration, cap: Duration, max_attempts: usize) -> Self {
        Self {
            kind,
            base,
            cap,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Single attempt, no retries.
    pub fn disabled() -> Self {
        Self::new(BackoffKind::NoBackoff, Duration::ZERO, Duration::ZERO, 1)
    }

    /// Fixed `interval` between attempts.
    pub fn no_backoff(interval: Duration, max_attempts: usize) -> Self {
        Self::new(BackoffKind::NoBackoff, interval, interval, max_attempts)
    }

    pub fn exponential(base: Duration, cap: Duration, max_attempts: usize) -> Self {
        Self::new(BackoffKind::Exponential, base, cap, max_attempts)
    }

    pub fn with_kind(mut self, kind: BackoffKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts.max(1)
    }

    /// Sleep before retry number `attempt` (0-based), drawing jitter from the
    /// thread-local generator.
    pub fn next_sleep(&self, attempt: usize, previous: Duration) -> Duration {
        self.next_sleep_with(attempt, previous, &mut rand::thread_rng())
    }

    /// Same as [`next_sleep`](Self::next_sleep) with an explicit random source.
    pub fn next_sleep_with<R: Rng + ?Sized>(
        &self,
        attempt: usize,
        previous: Duration,
        rng: &mut R,
    ) -> Duration {
        match self.kind {
            BackoffKind::NoBackoff => self.base,
            BackoffKind::Exponential => self.exponential_sleep(attempt),
            BackoffKind::EqualJitter => {
                let half = self.exponential_sleep(attempt) / 2;
                half.saturating_add(uniform(rng, half))
            }
            BackoffKind::FullJitter => uniform(rng, self.exponential_sleep(attempt)),
            BackoffKind::DecorrelatedJitter => {
                let tripled = previous.saturating_mul(3);
                if tripled <= self.base {
                    // Empty random range: fall back to the floor.
                    return self.base;
                }
                self.base
                    .saturating_add(uniform(rng, tripled - self.base))
                    .min(self.cap)
            }
        }
    }

    /// `min(cap, base * 2^attempt)`, saturating at `cap` on overflow.
    pub fn exponential_sleep(&self, attempt: usize) -> Duration {
        u32::try_from(attempt)
            .ok()
            .and_then(|exp| 2u32.checked_pow(exp))
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.cap, |sleep| sleep.min(self.cap))
    }
}

/// Uniform duration in `[0, upper)`; zero when the range is empty.
fn uniform<R: Rng + ?Sized>(rng: &mut R, upper: Duration) -> Duration {
    let nanos = u64::try_from(upper.as_nanos()).unwrap_or(u64::MAX);
    if nanos == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(rng.gen_range(0..nanos))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rand::{rngs::StdRng, SeedableRng};

    use super::{BackoffKind, BackoffPolicy};

    const BASE: Duration = Duration::from_millis(100);
    const CAP: Duration = Duration::from_millis(3_000);

    fn policy(kind: BackoffKind) -> BackoffPolicy {
        BackoffPolicy::new(kind, BASE, CAP, 5)
    }

    #[test]
    fn no_backoff_is_constant() {
        let policy = policy(BackoffKind::NoBackoff);
        let mut rng = StdRng::seed_from_u64(1);
        for attempt in 0..10 {
            assert_eq!(
                policy.next_sleep_with(attempt, Duration::from_secs(9), &mut rng),
                BASE
            );
        }
    }

    #[test]
    fn exponential_grows_then_caps() {
        let policy = policy(BackoffKind::Exponential);
        assert_eq!(policy.exponential_sleep(0), BASE);
        assert_eq!(policy.exponential_sleep(1), Duration::from_millis(200));
        assert_eq!(policy.exponential_sleep(4), Duration::from_millis(1_600));
        assert_eq!(policy.exponential_sleep(5), CAP);
        assert_eq!(policy.exponential_sleep(200), CAP);
        assert_eq!(policy.exponential_sleep(usize::MAX), CAP);
    }

    #[test]
    fn exponential_stays_between_base_and_cap() {
        let policy = policy(BackoffKind::Exponential);
        for attempt in 0..64 {
            let sleep = policy.exponential_sleep(attempt);
            assert!(sleep <= CAP);
            let uncapped = 2u128.pow(attempt as u32) * BASE.as_nanos();
            if uncapped <= CAP.as_nanos() {
                assert!(sleep >= BASE);
            }
        }
    }

    #[test]
    fn equal_jitter_is_within_upper_half() {
        let policy = policy(BackoffKind::EqualJitter);
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 0..12 {
            let exp = policy.exponential_sleep(attempt);
            for _ in 0..200 {
                let sleep = policy.next_sleep_with(attempt, Duration::ZERO, &mut rng);
                assert!(sleep >= exp / 2, "{sleep:?} < {:?}", exp / 2);
                assert!(sleep <= exp, "{sleep:?} > {exp:?}");
            }
        }
    }

    #[test]
    fn full_jitter_is_within_zero_and_exponential() {
        let policy = policy(BackoffKind::FullJitter);
        let mut rng = StdRng::seed_from_u64(11);
        for attempt in 0..12 {
            let exp = policy.exponential_sleep(attempt);
            for _ in 0..200 {
                let sleep = policy.next_sleep_with(attempt, Duration::ZERO, &mut rng);
                assert!(sleep <= exp);
            }
        }
    }

    #[test]
    fn decorrelated_jitter_clamps_to_base_when_range_is_empty() {
        let policy = policy(BackoffKind::DecorrelatedJitter);
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(policy.next_sleep_with(0, Duration::ZERO, &mut rng), BASE);
        assert_eq!(
            policy.next_sleep_with(0, Duration::from_millis(33), &mut rng),
            BASE
        );
    }

    #[test]
    fn decorrelated_jitter_walks_between_base_and_cap() {
        let policy = policy(BackoffKind::DecorrelatedJitter);
        let mut rng = StdRng::seed_from_u64(5);
        let mut previous = BASE;
        for attempt in 0..500 {
            let sleep = policy.next_sleep_with(attempt, previous, &mut rng);
            assert!(sleep >= BASE);
            assert!(sleep <= CAP);
            previous = sleep;
        }
    }

    #[test]
    fn seeded_sources_are_deterministic() {
        let policy = policy(BackoffKind::FullJitter);
        let mut first = StdRng::seed_from_u64(42);
        let mut second = StdRng::seed_from_u64(42);
        for attempt in 0..8 {
            assert_eq!(
                policy.next_sleep_with(attempt, Duration::ZERO, &mut first),
                policy.next_sleep_with(attempt, Duration::ZERO, &mut second)
            );
        }
    }

    #[test]
    fn max_attempts_never_drops_below_one() {
        let policy = BackoffPolicy::no_backoff(BASE, 0);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn kinds_parse_from_policy_names() {
        assert_eq!("ExpoBackOff".parse::<BackoffKind>().unwrap(), BackoffKind::Exponential);
        assert_eq!("NoBackOff".parse::<BackoffKind>().unwrap(), BackoffKind::NoBackoff);
        assert_eq!(
            "full_jitter".parse::<BackoffKind>().unwrap(),
            BackoffKind::FullJitter
        );
        assert_eq!(
            "ExpoDecorrjitter".parse::<BackoffKind>().unwrap(),
            BackoffKind::DecorrelatedJitter
        );
        for kind in [
            BackoffKind::NoBackoff,
            BackoffKind::Exponential,
            BackoffKind::EqualJitter,
            BackoffKind::FullJitter,
            BackoffKind::DecorrelatedJitter,
        ] {
            assert_eq!(kind.to_string().parse::<BackoffKind>().unwrap(), kind);
        }
        assert!("fibonacci".parse::<BackoffKind>().is_err());
    }
}
