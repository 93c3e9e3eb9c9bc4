//! Telemetry primitives: nanosecond timestamps, spans, half-open ranges, and
//! channel data descriptors.

use std::fmt;
use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

/// A point in time, in nanoseconds since the unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TimeStamp(pub i64);

impl TimeStamp {
    pub const MIN: TimeStamp = TimeStamp(i64::MIN);
    pub const MAX: TimeStamp = TimeStamp(i64::MAX);

    /// Returns the range starting at this timestamp and spanning `span`.
    pub fn span_range(self, span: TimeSpan) -> TimeRange {
        TimeRange::new(self, self + span)
    }

    /// Returns the range between this timestamp and `end`, swapping the
    /// endpoints if they arrive out of order.
    pub fn range(self, end: TimeStamp) -> TimeRange {
        if end < self {
            TimeRange::new(end, self)
        } else {
            TimeRange::new(self, end)
        }
    }
}

impl Add<TimeSpan> for TimeStamp {
    type Output = TimeStamp;
    fn add(self, rhs: TimeSpan) -> TimeStamp {
        TimeStamp(self.0.saturating_add(rhs.0))
    }
}

impl Sub<TimeSpan> for TimeStamp {
    type Output = TimeStamp;
    fn sub(self, rhs: TimeSpan) -> TimeStamp {
        TimeStamp(self.0.saturating_sub(rhs.0))
    }
}

impl Sub<TimeStamp> for TimeStamp {
    type Output = TimeSpan;
    fn sub(self, rhs: TimeStamp) -> TimeSpan {
        TimeSpan(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// A duration, in nanoseconds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TimeSpan(pub i64);

pub const NANOSECOND: TimeSpan = TimeSpan(1);
pub const MICROSECOND: TimeSpan = TimeSpan(1_000);
pub const MILLISECOND: TimeSpan = TimeSpan(1_000_000);
pub const SECOND: TimeSpan = TimeSpan(1_000_000_000);

impl TimeSpan {
    pub const ZERO: TimeSpan = TimeSpan(0);

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Converts the span to a std `Duration`. Negative spans clamp to zero.
    pub fn to_duration(self) -> std::time::Duration {
        std::time::Duration::from_nanos(self.0.max(0) as u64)
    }
}

impl Mul<i64> for TimeSpan {
    type Output = TimeSpan;
    fn mul(self, rhs: i64) -> TimeSpan {
        TimeSpan(self.0 * rhs)
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// A half-open time interval `[start, end)`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
pub struct TimeRange {
    pub start: TimeStamp,
    pub end: TimeStamp,
}

impl TimeRange {
    /// The range covering all representable time.
    pub const MAX: TimeRange = TimeRange {
        start: TimeStamp::MIN,
        end: TimeStamp::MAX,
    };

    pub fn new(start: TimeStamp, end: TimeStamp) -> TimeRange {
        TimeRange { start, end }
    }

    pub fn span(&self) -> TimeSpan {
        self.end - self.start
    }

    /// Whether `stamp` falls within `[start, end)`.
    pub fn contains(&self, stamp: TimeStamp) -> bool {
        stamp >= self.start && stamp < self.end
    }

    /// Whether the two ranges share any instant.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Sample rate of a channel, in Hz.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataRate(pub f64);

impl DataRate {
    pub fn hz(rate: f64) -> DataRate {
        DataRate(rate)
    }

    /// The span between consecutive samples.
    pub fn period(&self) -> TimeSpan {
        TimeSpan((SECOND.0 as f64 / self.0) as i64)
    }

    /// The number of samples that fit in `span`.
    pub fn sample_count(&self, span: TimeSpan) -> usize {
        (span.0 as f64 * self.0 / SECOND.0 as f64) as usize
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz", self.0)
    }
}

/// The sample type stored in a channel. The distribution layer treats sample
/// payloads as opaque bytes; the type is carried so that leaseholders can
/// hand it to their engine at channel creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Float64,
    Float32,
    Int64,
    Int32,
    Uint8,
}

impl DataType {
    /// Bytes per sample.
    pub fn density(&self) -> usize {
        match self {
            DataType::Float64 | DataType::Int64 => 8,
            DataType::Float32 | DataType::Int32 => 4,
            DataType::Uint8 => 1,
        }
    }
}

impl Default for DataType {
    fn default() -> Self {
        DataType::Float64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_range_advances_by_span() {
        let r = TimeStamp(0).span_range(SECOND * 10);
        assert_eq!(r, TimeRange::new(TimeStamp(0), TimeStamp(10_000_000_000)));
        assert_eq!(r.span(), SECOND * 10);
    }

    #[test]
    fn range_is_half_open() {
        let r = TimeRange::new(TimeStamp(0), TimeStamp(10));
        assert!(r.contains(TimeStamp(0)));
        assert!(r.contains(TimeStamp(9)));
        assert!(!r.contains(TimeStamp(10)));
    }

    #[test]
    fn overlap_excludes_touching_ranges() {
        let a = TimeRange::new(TimeStamp(0), TimeStamp(10));
        let b = TimeRange::new(TimeStamp(10), TimeStamp(20));
        let c = TimeRange::new(TimeStamp(5), TimeStamp(15));
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&b));
    }

    #[test]
    fn data_rate_arithmetic() {
        let dr = DataRate::hz(25.0);
        assert_eq!(dr.period(), TimeSpan(40_000_000));
        assert_eq!(dr.sample_count(SECOND * 10), 250);
    }
}
