use std::time::Duration;

use crate::clock::Timestamp;

/// A signed relative delay in nanoseconds.
///
/// Zero and negative delays are valid and mean "as soon as the dispatcher next runs".
/// All constructors saturate instead of overflowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Delay(i64);

impl Delay {
    pub const ZERO: Delay = Delay(0);
    pub const MAX: Delay = Delay(i64::MAX);
    pub const MIN: Delay = Delay(i64::MIN);

    pub const fn from_nanos(nanos: i64) -> Self {
        Delay(nanos)
    }

    pub const fn from_micros(micros: i64) -> Self {
        Delay(micros.saturating_mul(1_000))
    }

    pub const fn from_millis(millis: i64) -> Self {
        Delay(millis.saturating_mul(1_000_000))
    }

    pub const fn from_secs(secs: i64) -> Self {
        Delay(secs.saturating_mul(1_000_000_000))
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl From<Duration> for Delay {
    fn from(duration: Duration) -> Self {
        Delay(i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX))
    }
}

/// Absolute deadline for a delay measured from `now`.
///
/// Non-positive delays yield `now`; positive ones saturate at [`Timestamp::MAX`].
pub fn compute_deadline(now: Timestamp, delay: Delay) -> Timestamp {
    if !delay.is_positive() {
        return now;
    }
    Timestamp::from_nanos(now.as_nanos().saturating_add(delay.as_nanos()))
}
