//! Trace-time primitives.
//!
//! All timestamps share a single clock domain: nanoseconds since the trace
//! epoch, stored as a signed 64-bit integer. Durations are plain `i64`
//! nanosecond deltas and may be negative.

use std::fmt;

/// Nanosecond delta between two [`TimeNs`] values.
pub type DurationNs = i64;

pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A point in trace time.
///
/// Valid trace timestamps are never negative, so `-1` doubles as an explicit
/// "unset" sentinel ([`TimeNs::INVALID`]) without needing an `Option`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeNs(i64);

impl TimeNs {
    pub const INVALID: TimeNs = TimeNs(-1);
    pub const ZERO: TimeNs = TimeNs(0);
    pub const MIN: TimeNs = TimeNs(0);
    pub const MAX: TimeNs = TimeNs(i64::MAX);

    pub const fn from_raw(raw: i64) -> TimeNs {
        TimeNs(raw)
    }

    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Lossy. `f64` cannot represent the full nanosecond range, so only use
    /// this where strict accuracy is not required.
    pub fn from_seconds(seconds: f64) -> TimeNs {
        TimeNs((seconds * NANOS_PER_SEC as f64).floor() as i64)
    }

    /// Lossy and slow. Avoid in the render loop.
    pub fn to_seconds(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    pub fn add(self, d: DurationNs) -> TimeNs {
        TimeNs(self.0 + d)
    }

    pub fn sub(self, d: DurationNs) -> TimeNs {
        TimeNs(self.0 - d)
    }

    pub fn diff(self, other: TimeNs) -> DurationNs {
        self.0 - other.0
    }

    pub fn min(self, other: TimeNs) -> TimeNs {
        TimeNs(self.0.min(other.0))
    }

    pub fn max(self, other: TimeNs) -> TimeNs {
        TimeNs(self.0.max(other.0))
    }

    /// Round down to a multiple of `step`.
    pub fn quant_floor(self, step: DurationNs) -> TimeNs {
        debug_assert!(step > 0);
        TimeNs(self.0.div_euclid(step) * step)
    }

    /// Round up to a multiple of `step`.
    pub fn quant_ceil(self, step: DurationNs) -> TimeNs {
        debug_assert!(step > 0);
        let floored = self.0.div_euclid(step) * step;
        if floored == self.0 {
            TimeNs(floored)
        } else {
            TimeNs(floored + step)
        }
    }

    /// Round to the nearest multiple of `step`.
    pub fn quant(self, step: DurationNs) -> TimeNs {
        debug_assert!(step > 0);
        TimeNs((self.0 + step / 2).div_euclid(step) * step)
    }
}

impl fmt::Display for TimeNs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A half-open interval `[start, end)` over trace time.
///
/// `start <= end` always holds; a zero-width span is permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSpan {
    start: TimeNs,
    end: TimeNs,
}

impl TimeSpan {
    pub const ZERO: TimeSpan = TimeSpan {
        start: TimeNs::ZERO,
        end: TimeNs::ZERO,
    };

    /// Panics if `start > end`. A reversed span is a logic error upstream,
    /// never something to silently repair.
    pub fn new(start: TimeNs, end: TimeNs) -> TimeSpan {
        assert!(
            start <= end,
            "span start [{start}] cannot be greater than end [{end}]"
        );
        TimeSpan { start, end }
    }

    pub fn start(&self) -> TimeNs {
        self.start
    }

    pub fn end(&self) -> TimeNs {
        self.end
    }

    pub fn duration(&self) -> DurationNs {
        self.end.diff(self.start)
    }

    pub fn midpoint(&self) -> TimeNs {
        TimeNs::from_raw((self.start.raw() + self.end.raw()) / 2)
    }

    pub fn contains(&self, t: TimeNs) -> bool {
        self.start <= t && t < self.end
    }

    pub fn contains_span(&self, other: &TimeSpan) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn intersects(&self, start: TimeNs, end: TimeNs) -> bool {
        !(end <= self.start || start >= self.end)
    }

    pub fn intersects_span(&self, other: &TimeSpan) -> bool {
        self.intersects(other.start, other.end)
    }

    pub fn add(&self, offset: DurationNs) -> TimeSpan {
        TimeSpan::new(self.start.add(offset), self.end.add(offset))
    }

    /// Widen the span by `padding` on both sides.
    pub fn pad(&self, padding: DurationNs) -> TimeSpan {
        TimeSpan::new(self.start.sub(padding), self.end.add(padding))
    }
}

/// Print a duration to a handful of significant figures, e.g. `1.2ms`.
pub fn humanise_duration(dur: DurationNs) -> String {
    let sec = dur as f64 / NANOS_PER_SEC as f64;
    let units = ["s", "ms", "us", "ns"];
    let sign = if sec < 0.0 { "-" } else { "" };
    let mut n = sec.abs();
    let mut u = 0;
    while n < 1.0 && n != 0.0 && u < units.len() - 1 {
        n *= 1000.0;
        u += 1;
    }
    format!("{sign}{}{}", (n * 10.0).round() / 10.0, units[u])
}

/// Print a duration with absolute precision, e.g. `1s 230ms 4us`.
pub fn format_duration(dur: DurationNs) -> String {
    if dur < 1 {
        return "0s".to_string();
    }
    let mut rest = dur;
    let mut result = String::new();
    let units: [(&str, i64); 6] = [
        ("h", 3_600_000_000_000),
        ("m", 60_000_000_000),
        ("s", 1_000_000_000),
        ("ms", 1_000_000),
        ("us", 1_000),
        ("ns", 1),
    ];
    for (unit, unit_size) in units {
        if rest >= unit_size {
            result.push_str(&format!("{}{} ", rest / unit_size, unit));
            rest %= unit_size;
        }
    }
    result.pop();
    result
}

/// A timestamp split into display groups, each padded with leading zeros.
#[derive(Debug, Clone)]
pub struct Timecode {
    pub sign: &'static str,
    pub days: String,
    pub hours: String,
    pub minutes: String,
    pub seconds: String,
    pub millis: String,
    pub micros: String,
    pub nanos: String,
}

impl Timecode {
    pub fn new(time: TimeNs) -> Timecode {
        let sign = if time.raw() < 0 { "-" } else { "" };
        let abs = time.raw().unsigned_abs();

        let days = abs / 86_400_000_000_000;
        let hours = (abs / 3_600_000_000_000) % 24;
        let minutes = (abs / 60_000_000_000) % 60;
        let seconds = (abs / 1_000_000_000) % 60;
        let millis = (abs / 1_000_000) % 1_000;
        let micros = (abs / 1_000) % 1_000;
        let nanos = abs % 1_000;

        Timecode {
            sign,
            days: days.to_string(),
            hours: format!("{hours:02}"),
            minutes: format!("{minutes:02}"),
            seconds: format!("{seconds:02}"),
            millis: format!("{millis:03}"),
            micros: format!("{micros:03}"),
            nanos: format!("{nanos:03}"),
        }
    }

    /// The upper part of the timecode: `[-]DdHH:MM:SS`.
    pub fn dhhmmss(&self) -> String {
        let days = if self.days == "0" {
            String::new()
        } else {
            format!("{}d", self.days)
        };
        format!(
            "{}{}{}:{}:{}",
            self.sign, days, self.hours, self.minutes, self.seconds
        )
    }

    /// The subsecond part: `mmm uuu nnn`.
    pub fn subsec(&self) -> String {
        format!("{} {} {}", self.millis, self.micros, self.nanos)
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dhhmmss(), self.subsec())
    }
}

/// How timestamps are presented to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampFormat {
    #[default]
    Timecode,
    Seconds,
    Raw,
}

impl TimestampFormat {
    pub const ALL: [TimestampFormat; 3] = [
        TimestampFormat::Timecode,
        TimestampFormat::Seconds,
        TimestampFormat::Raw,
    ];

    /// Offset between t=0 and the displayed time domain. Timecode and
    /// seconds rebase onto the trace start; raw shows absolute values.
    pub fn domain_offset(self, trace_start: TimeNs) -> TimeNs {
        match self {
            TimestampFormat::Timecode | TimestampFormat::Seconds => trace_start,
            TimestampFormat::Raw => TimeNs::ZERO,
        }
    }
}

impl fmt::Display for TimestampFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampFormat::Timecode => write!(f, "Timecode"),
            TimestampFormat::Seconds => write!(f, "Seconds"),
            TimestampFormat::Raw => write!(f, "Raw"),
        }
    }
}

/// Rebase an absolute trace timestamp into the displayed time domain.
pub fn to_domain_time(ts: TimeNs, offset: TimeNs) -> TimeNs {
    ts.sub(offset.raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_rejects_reversed_bounds() {
        let result = std::panic::catch_unwind(|| {
            TimeSpan::new(TimeNs::from_raw(10), TimeNs::from_raw(5))
        });
        assert!(result.is_err());
    }

    #[test]
    fn span_zero_width_is_permitted() {
        let span = TimeSpan::new(TimeNs::from_raw(7), TimeNs::from_raw(7));
        assert_eq!(span.duration(), 0);
        assert!(!span.contains(TimeNs::from_raw(7)));
    }

    #[test]
    fn span_contains_and_intersects() {
        let span = TimeSpan::new(TimeNs::from_raw(100), TimeNs::from_raw(200));
        assert!(span.contains(TimeNs::from_raw(100)));
        assert!(span.contains(TimeNs::from_raw(199)));
        assert!(!span.contains(TimeNs::from_raw(200)));

        assert!(span.intersects(TimeNs::from_raw(150), TimeNs::from_raw(300)));
        assert!(!span.intersects(TimeNs::from_raw(200), TimeNs::from_raw(300)));
        assert!(span.contains_span(&TimeSpan::new(
            TimeNs::from_raw(120),
            TimeNs::from_raw(180)
        )));
    }

    #[test]
    fn span_pad_and_add() {
        let span = TimeSpan::new(TimeNs::from_raw(100), TimeNs::from_raw(200));
        let padded = span.pad(50);
        assert_eq!(padded.start().raw(), 50);
        assert_eq!(padded.end().raw(), 250);

        let shifted = span.add(-100);
        assert_eq!(shifted.start().raw(), 0);
        assert_eq!(shifted.end().raw(), 100);
    }

    #[test]
    fn quantization() {
        let t = TimeNs::from_raw(1234);
        assert_eq!(t.quant_floor(100).raw(), 1200);
        assert_eq!(t.quant_ceil(100).raw(), 1300);
        assert_eq!(t.quant(100).raw(), 1200);
        assert_eq!(TimeNs::from_raw(1250).quant(100).raw(), 1300);

        // Euclidean rounding keeps negative times on the grid.
        assert_eq!(TimeNs::from_raw(-50).quant_floor(100).raw(), -100);
        assert_eq!(TimeNs::from_raw(-50).quant_ceil(100).raw(), 0);
        assert_eq!(TimeNs::from_raw(1200).quant_ceil(100).raw(), 1200);
    }

    #[test]
    fn humanise() {
        assert_eq!(humanise_duration(1_230_000_023), "1.2s");
        assert_eq!(humanise_duration(123_456_789), "123.5ms");
        assert_eq!(humanise_duration(1234), "1.2us");
        assert_eq!(humanise_duration(0), "0s");
        assert_eq!(humanise_duration(-1_500_000_000), "-1.5s");
    }

    #[test]
    fn format_absolute() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(1_000_000_023), "1s 23ns");
        assert_eq!(format_duration(3_661_000_000_000), "1h 1m 1s");
    }

    #[test]
    fn timecode_groups() {
        let tc = Timecode::new(TimeNs::from_raw(
            86_400_000_000_000 + 3_600_000_000_000 + 61_000_000_123,
        ));
        assert_eq!(tc.dhhmmss(), "1d01:01:01");
        assert_eq!(tc.subsec(), "000 000 123");
    }

    #[test]
    fn domain_offset_rebases() {
        let start = TimeNs::from_raw(1_000);
        assert_eq!(
            TimestampFormat::Timecode.domain_offset(start),
            start
        );
        assert_eq!(TimestampFormat::Raw.domain_offset(start), TimeNs::ZERO);
        assert_eq!(to_domain_time(TimeNs::from_raw(1500), start).raw(), 500);
    }
}
