use std::fmt;
use std::time::Duration;

/// A point on an engine's monotonic timeline, in nanoseconds since the clock origin.
///
/// Timestamps never go backwards for a given clock and are unaffected by wall-clock
/// adjustments. [`Timestamp::MAX`] is the farthest representable instant; saturated
/// deadlines land there and sort after everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The clock origin. Also the deadline of a timer that was never scheduled.
    pub const ZERO: Timestamp = Timestamp(0);

    /// The maximum representable instant.
    pub const MAX: Timestamp = Timestamp(i64::MAX);

    pub const fn from_nanos(nanos: i64) -> Self {
        Timestamp(nanos)
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Time elapsed from `earlier` to `self`, or zero if `earlier` is later.
    pub fn saturating_duration_since(self, earlier: Timestamp) -> Duration {
        match self.0.checked_sub(earlier.0) {
            Some(nanos) if nanos > 0 => Duration::from_nanos(nanos as u64),
            _ => Duration::ZERO,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// Where a [`MonotonicClock`] reads the current time from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockSource {
    /// `std::time::Instant`. Independent of any Tokio runtime.
    System,
    /// `tokio::time::Instant`, so a paused test runtime drives the engine.
    #[default]
    Runtime,
}

/// Monotonic clock anchored at the moment it was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: std::time::Instant,
    source: ClockSource,
}

impl MonotonicClock {
    pub fn new(source: ClockSource) -> Self {
        MonotonicClock {
            origin: Self::read(source),
            source,
        }
    }

    pub fn source(&self) -> ClockSource {
        self.source
    }

    /// Current instant on this clock.
    pub fn now(&self) -> Timestamp {
        let elapsed = Self::read(self.source).saturating_duration_since(self.origin);
        Timestamp(i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX))
    }

    /// Converts a timestamp into a Tokio instant suitable for `sleep_until`.
    ///
    /// Returns `None` when the instant cannot be represented by the platform clock.
    pub fn to_instant(&self, at: Timestamp) -> Option<tokio::time::Instant> {
        let offset = Duration::from_nanos(at.0.max(0) as u64);
        self.origin
            .checked_add(offset)
            .map(tokio::time::Instant::from_std)
    }

    fn read(source: ClockSource) -> std::time::Instant {
        match source {
            ClockSource::System => std::time::Instant::now(),
            ClockSource::Runtime => tokio::time::Instant::now().into_std(),
        }
    }
}
