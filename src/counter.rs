//! Counter series: display-value derivation, bucket aggregation and y-axis
//! range resolution.
//!
//! Raw counter samples are `(ts, value)` pairs ordered by timestamp. The
//! pipeline turns them into display values according to the configured mode,
//! groups them into resolution-sized buckets and resolves the axis range the
//! track paints against.

use std::collections::HashMap;

use crate::time::{DurationNs, TimeNs, NANOS_PER_SEC};

/// Fallback inter-sample gap for the final sample in rate mode. Keeps the
/// denominator non-zero without producing an outlier.
pub const RATE_FALLBACK_GAP_NS: DurationNs = 100;

/// How the y value is derived from the raw counter value.
///
/// `Value` plots the counter directly, `Delta` the difference to the next
/// sample and `Rate` that difference normalised by the sample gap in
/// seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueMode {
    #[default]
    Value,
    Delta,
    Rate,
}

/// Whether the y scale covers the whole trace (static axis) or only the
/// currently visible samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YRange {
    #[default]
    All,
    Viewport,
}

/// How the y scale is anchored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YDisplay {
    /// Always include the origin.
    #[default]
    Zero,
    /// Cover just the value range.
    MinMax,
    /// As MinMax, on a log scale.
    Log,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YRounding {
    Strict,
    #[default]
    HumanReadable,
}

/// Resolved per-track counter configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterOptions {
    pub y_mode: ValueMode,
    pub y_range: YRange,
    pub y_display: YDisplay,
    pub y_rounding: YRounding,
    /// Extend the axis maximum, e.g. to 100 for percentage counters whose
    /// trace never reaches it.
    pub y_override_maximum: Option<f64>,
    pub y_override_minimum: Option<f64>,
    /// Counters with the same key lock to a common y scale.
    pub y_range_sharing_key: Option<String>,
    pub enlarge: bool,
    /// Unit shown in the tooltip and axis label.
    pub unit: String,
}

impl Default for CounterOptions {
    fn default() -> Self {
        CounterOptions {
            y_mode: ValueMode::Value,
            y_range: YRange::All,
            y_display: YDisplay::Zero,
            y_rounding: YRounding::HumanReadable,
            y_override_maximum: None,
            y_override_minimum: None,
            y_range_sharing_key: None,
            enlarge: false,
            unit: String::new(),
        }
    }
}

/// Optional per-field overrides applied on top of the defaults, each field
/// resolved explicitly at construction.
#[derive(Debug, Clone, Default)]
pub struct CounterOptionOverrides {
    pub y_mode: Option<ValueMode>,
    pub y_range: Option<YRange>,
    pub y_display: Option<YDisplay>,
    pub y_rounding: Option<YRounding>,
    pub y_override_maximum: Option<f64>,
    pub y_override_minimum: Option<f64>,
    pub y_range_sharing_key: Option<String>,
    pub enlarge: Option<bool>,
    pub unit: Option<String>,
}

impl CounterOptionOverrides {
    /// Layer `self` over `fallback`: fields set here win, unset fields
    /// fall through.
    pub fn or(&self, fallback: &CounterOptionOverrides) -> CounterOptionOverrides {
        CounterOptionOverrides {
            y_mode: self.y_mode.or(fallback.y_mode),
            y_range: self.y_range.or(fallback.y_range),
            y_display: self.y_display.or(fallback.y_display),
            y_rounding: self.y_rounding.or(fallback.y_rounding),
            y_override_maximum: self.y_override_maximum.or(fallback.y_override_maximum),
            y_override_minimum: self.y_override_minimum.or(fallback.y_override_minimum),
            y_range_sharing_key: self
                .y_range_sharing_key
                .clone()
                .or_else(|| fallback.y_range_sharing_key.clone()),
            enlarge: self.enlarge.or(fallback.enlarge),
            unit: self.unit.clone().or_else(|| fallback.unit.clone()),
        }
    }
}

impl CounterOptions {
    pub fn resolve(overrides: &CounterOptionOverrides) -> CounterOptions {
        let defaults = CounterOptions::default();
        CounterOptions {
            y_mode: overrides.y_mode.unwrap_or(defaults.y_mode),
            y_range: overrides.y_range.unwrap_or(defaults.y_range),
            y_display: overrides.y_display.unwrap_or(defaults.y_display),
            y_rounding: overrides.y_rounding.unwrap_or(defaults.y_rounding),
            y_override_maximum: overrides.y_override_maximum,
            y_override_minimum: overrides.y_override_minimum,
            y_range_sharing_key: overrides.y_range_sharing_key.clone(),
            enlarge: overrides.enlarge.unwrap_or(defaults.enlarge),
            unit: overrides.unit.clone().unwrap_or(defaults.unit),
        }
    }

    pub fn log_scale(&self) -> bool {
        self.y_display == YDisplay::Log
    }
}

/// Aggregated, display-ready counter buckets.
///
/// All columns have identical length; index `i` across them refers to the
/// same bucket. Instances are rebuilt wholesale on every fetch and swapped
/// in as a unit, never patched in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CounterData {
    pub timestamps: Vec<TimeNs>,
    pub counts: Vec<u32>,
    pub avg_values: Vec<f64>,
    pub min_display_values: Vec<f64>,
    pub max_display_values: Vec<f64>,
    pub last_display_values: Vec<f64>,
    /// Min/max of the display values seen in this window, zero-anchored.
    pub display_value_range: (f64, f64),
}

impl CounterData {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn assert_consistent(&self) {
        let n = self.timestamps.len();
        assert!(self.counts.len() == n);
        assert!(self.avg_values.len() == n);
        assert!(self.min_display_values.len() == n);
        assert!(self.max_display_values.len() == n);
        assert!(self.last_display_values.len() == n);
    }
}

/// Trace-wide display-value extremes plus the largest inter-sample gap.
/// Computed once per option set and reused to size a static axis and to
/// extend query windows so the sample preceding the window is included.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterLimits {
    pub min_display_value: f64,
    pub max_display_value: f64,
    pub max_gap: DurationNs,
}

/// Derive per-sample mode values. `Delta` and `Rate` look one sample ahead;
/// the final sample uses itself as the lookahead, so its delta is zero.
pub fn mode_values(ts: &[TimeNs], values: &[f64], mode: ValueMode) -> Vec<f64> {
    match mode {
        ValueMode::Value => values.to_vec(),
        ValueMode::Delta => (0..values.len())
            .map(|i| {
                let next = values.get(i + 1).copied().unwrap_or(values[i]);
                next - values[i]
            })
            .collect(),
        ValueMode::Rate => (0..values.len())
            .map(|i| {
                let next = values.get(i + 1).copied().unwrap_or(values[i]);
                let delta = next - values[i];
                let gap = match ts.get(i + 1) {
                    Some(next_ts) => next_ts.diff(ts[i]),
                    None => RATE_FALLBACK_GAP_NS,
                };
                let gap = if gap <= 0 { RATE_FALLBACK_GAP_NS } else { gap };
                delta / (gap as f64 / NANOS_PER_SEC as f64)
            })
            .collect(),
    }
}

/// Apply the display transform. On a log axis values pass through `ln`,
/// with non-positive inputs mapped to zero instead of NaN.
pub fn display_values(mode_vals: &[f64], log_scale: bool) -> Vec<f64> {
    if !log_scale {
        return mode_vals.to_vec();
    }
    mode_vals
        .iter()
        .map(|&v| if v > 0.0 { v.ln() } else { 0.0 })
        .collect()
}

/// Largest gap between consecutive samples. Zero for traces with fewer
/// than two samples.
pub fn max_sample_gap(ts: &[TimeNs]) -> DurationNs {
    ts.windows(2)
        .map(|pair| pair[1].diff(pair[0]))
        .max()
        .unwrap_or(0)
}

/// Trace-wide limits for the given option set.
pub fn compute_limits(
    ts: &[TimeNs],
    values: &[f64],
    mode: ValueMode,
    log_scale: bool,
) -> CounterLimits {
    let display = display_values(&mode_values(ts, values, mode), log_scale);
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &v in &display {
        min = min.min(v);
        max = max.max(v);
    }
    if display.is_empty() {
        min = 0.0;
        max = 0.0;
    }
    CounterLimits {
        min_display_value: min,
        max_display_value: max,
        max_gap: max_sample_gap(ts),
    }
}

/// Group samples into `bucket`-sized buckets and compute the per-bucket
/// statistics. Inputs must be parallel arrays ordered by timestamp; the
/// caller is expected to have restricted them to the query window already.
///
/// Timestamps are rounded to the nearest bucket boundary. Empty buckets are
/// simply absent from the output. `last` is the display value at the
/// greatest timestamp in the bucket.
pub fn aggregate(
    ts: &[TimeNs],
    mode_vals: &[f64],
    display: &[f64],
    bucket: DurationNs,
) -> CounterData {
    debug_assert!(bucket > 0);
    debug_assert!(ts.len() == mode_vals.len() && ts.len() == display.len());

    let mut data = CounterData::default();
    let (mut range_min, mut range_max) = (0.0f64, 0.0f64);

    let mut i = 0;
    while i < ts.len() {
        let tsq = ts[i].quant(bucket);
        let mut count = 0u32;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut last = 0.0;

        while i < ts.len() && ts[i].quant(bucket) == tsq {
            count += 1;
            sum += mode_vals[i];
            min = min.min(display[i]);
            max = max.max(display[i]);
            last = display[i];
            i += 1;
        }

        data.timestamps.push(tsq);
        data.counts.push(count);
        data.avg_values.push(sum / count as f64);
        data.min_display_values.push(min);
        data.max_display_values.push(max);
        data.last_display_values.push(last);
        range_min = range_min.min(min);
        range_max = range_max.max(max);
    }

    data.display_value_range = (range_min, range_max);
    data.assert_consistent();
    data
}

/// Round `n` away from zero to a "nice" boundary near its order of
/// magnitude.
pub fn round_away(n: f64) -> f64 {
    let sign = if n > 0.0 {
        1.0
    } else if n < 0.0 {
        -1.0
    } else {
        return 0.0;
    };
    let exp = n.abs().max(1.0).log10().ceil();
    let pow10 = 10f64.powf(exp);
    let step = pow10 / 20.0;
    sign * (n.abs() / step).ceil() * step
}

/// Format a magnitude with a metric suffix, e.g. `1500000` as `2M`.
pub fn to_label(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    let units: [(f64, &str); 8] = [
        (0.000000001, "n"),
        (0.000001, "u"),
        (0.001, "m"),
        (1.0, ""),
        (1000.0, "K"),
        (1_000_000.0, "M"),
        (1_000_000_000.0, "G"),
        (1_000_000_000_000.0, "T"),
    ];
    let (mut largest_multiplier, mut largest_unit) = units[0];
    for (multiplier, unit) in units {
        if multiplier >= n {
            break;
        }
        largest_multiplier = multiplier;
        largest_unit = unit;
    }
    format!("{}{largest_unit}", (n / largest_multiplier).round())
}

/// The resolved axis: bounds, extent and the label printed in the track
/// corner.
#[derive(Debug, Clone, PartialEq)]
pub struct YAxisRange {
    pub y_min: f64,
    pub y_max: f64,
    pub y_range: f64,
    pub label: String,
}

/// Resolve the axis range for one render of a counter track.
///
/// Widening through the sharer is persistent: a shared range only ever
/// grows for the lifetime of the sharer.
pub fn compute_y_range(
    options: &CounterOptions,
    limits: &CounterLimits,
    data_range: (f64, f64),
    sharer: &mut RangeSharer,
) -> YAxisRange {
    let mut y_min = limits.min_display_value;
    let mut y_max = limits.max_display_value;

    if options.y_range == YRange::Viewport {
        (y_min, y_max) = data_range;
    }

    if options.y_display == YDisplay::Zero {
        y_min = y_min.min(0.0);
    }

    if let Some(over) = options.y_override_maximum {
        y_max = y_max.max(over);
    }
    if let Some(over) = options.y_override_minimum {
        y_min = y_min.min(over);
    }

    if options.y_rounding == YRounding::HumanReadable {
        if options.y_display == YDisplay::Log {
            // Round in the linear domain, then map back.
            y_max = safe_ln(round_away(y_max.exp()));
            y_min = safe_ln(round_away(y_min.exp()));
        } else {
            y_max = round_away(y_max);
            y_min = round_away(y_min);
        }
    }

    (y_min, y_max) = sharer.share(options, (y_min, y_max));

    let mut label = if options.y_display == YDisplay::MinMax {
        "min - max".to_string()
    } else {
        let (mut min, mut max) = (y_min, y_max);
        if options.y_display == YDisplay::Log {
            min = min.exp();
            max = max.exp();
        }
        to_label((max - min).abs())
    };

    match options.y_mode {
        ValueMode::Value => label.push_str(&format!(" {}", options.unit)),
        ValueMode::Delta => label.push_str(&format!("\u{0394}{}", options.unit)),
        ValueMode::Rate => label.push_str(&format!("\u{0394}{}/s", options.unit)),
    }

    if options.y_display == YDisplay::Log {
        label = format!("log({label})");
    }

    YAxisRange {
        y_min,
        y_max,
        y_range: y_max - y_min,
        label,
    }
}

fn safe_ln(v: f64) -> f64 {
    if v > 0.0 { v.ln() } else { 0.0 }
}

/// Shared y ranges for counters carrying the same sharing key.
///
/// An explicit service injected into counter tracks at construction. Ranges
/// widen monotonically per tag and are never reset while the sharer lives.
#[derive(Debug, Default)]
pub struct RangeSharer {
    tag_to_range: HashMap<String, (f64, f64)>,
    key_to_enabled: HashMap<String, bool>,
}

impl RangeSharer {
    pub fn new() -> RangeSharer {
        RangeSharer::default()
    }

    pub fn is_enabled(&self, key: &str) -> bool {
        self.key_to_enabled.get(key).copied().unwrap_or(true)
    }

    pub fn set_enabled(&mut self, key: &str, enabled: bool) {
        self.key_to_enabled.insert(key.to_string(), enabled);
    }

    /// Fold `(min, max)` into the range shared under the options' key and
    /// return the union seen so far. Counters without a key, or with
    /// sharing disabled, pass through unchanged.
    pub fn share(&mut self, options: &CounterOptions, range: (f64, f64)) -> (f64, f64) {
        let Some(key) = options.y_range_sharing_key.as_deref() else {
            return range;
        };
        if !self.is_enabled(key) {
            return range;
        }

        // Counters only share when they agree on how values are derived.
        let tag = format!(
            "{key}-{:?}-{:?}-{}",
            options.y_mode, options.y_display, options.enlarge
        );
        let entry = self.tag_to_range.entry(tag).or_insert(range);
        entry.0 = entry.0.min(range.0);
        entry.1 = entry.1.max(range.1);
        *entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(raw: i64) -> TimeNs {
        TimeNs::from_raw(raw)
    }

    #[test]
    fn single_bucket_statistics() {
        // All samples fall into the bucket at 0.
        let ts = [t(10), t(20), t(30), t(40)];
        let values = [4.0, 8.0, 2.0, 6.0];
        let mode_vals = mode_values(&ts, &values, ValueMode::Value);
        let display = display_values(&mode_vals, false);
        let data = aggregate(&ts, &mode_vals, &display, 1_000);

        assert_eq!(data.len(), 1);
        assert_eq!(data.counts[0], 4);
        assert_eq!(data.avg_values[0], 5.0);
        assert_eq!(data.min_display_values[0], 2.0);
        assert_eq!(data.max_display_values[0], 8.0);
        // Last observed value, i.e. the value at the greatest timestamp.
        assert_eq!(data.last_display_values[0], 6.0);
    }

    #[test]
    fn buckets_round_to_nearest_boundary() {
        let ts = [t(100), t(480), t(520), t(900)];
        let values = [1.0, 2.0, 3.0, 4.0];
        let mode_vals = mode_values(&ts, &values, ValueMode::Value);
        let data = aggregate(&ts, &mode_vals, &mode_vals, 1_000);

        // 100 and 480 round to 0; 520 and 900 round to 1000.
        assert_eq!(data.timestamps, vec![t(0), t(1_000)]);
        assert_eq!(data.counts, vec![2, 2]);
    }

    #[test]
    fn delta_boundary_sample_is_zero() {
        let ts = [t(0), t(100), t(200)];
        let values = [1.0, 4.0, 9.0];
        let deltas = mode_values(&ts, &values, ValueMode::Delta);
        assert_eq!(deltas, vec![3.0, 5.0, 0.0]);
    }

    #[test]
    fn rate_single_sample_is_finite() {
        let ts = [t(500)];
        let values = [42.0];
        let rates = mode_values(&ts, &values, ValueMode::Rate);
        assert_eq!(rates.len(), 1);
        assert!(rates[0].is_finite());
        assert_eq!(rates[0], 0.0);

        let data = aggregate(&ts, &rates, &rates, 1_000);
        assert_eq!(data.len(), 1);
        assert!(data.avg_values[0].is_finite());
    }

    #[test]
    fn rate_normalises_by_gap_seconds() {
        let ts = [t(0), t(500_000_000)];
        let values = [0.0, 10.0];
        let rates = mode_values(&ts, &values, ValueMode::Rate);
        // 10 units over half a second.
        assert_eq!(rates[0], 20.0);
    }

    #[test]
    fn log_display_guards_nonpositive_values() {
        let display = display_values(&[0.0, -3.0, 1.0], true);
        assert_eq!(display[0], 0.0);
        assert_eq!(display[1], 0.0);
        assert_eq!(display[2], 0.0);
        assert!(display.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn limits_cover_the_whole_trace() {
        let ts = [t(0), t(1_000), t(5_000)];
        let values = [3.0, -2.0, 7.0];
        let limits = compute_limits(&ts, &values, ValueMode::Value, false);
        assert_eq!(limits.min_display_value, -2.0);
        assert_eq!(limits.max_display_value, 7.0);
        assert_eq!(limits.max_gap, 4_000);
    }

    #[test]
    fn round_away_rounds_outward() {
        assert_eq!(round_away(0.0), 0.0);
        assert_eq!(round_away(923.0), 950.0);
        assert_eq!(round_away(1.0), 1.0);
        assert_eq!(round_away(-923.0), -950.0);
    }

    #[test]
    fn magnitude_labels() {
        assert_eq!(to_label(0.0), "0");
        assert_eq!(to_label(1_500_000.0), "2M");
        assert_eq!(to_label(950.0), "950");
        assert_eq!(to_label(2_000.0), "2K");
    }

    #[test]
    fn y_range_includes_zero_when_anchored() {
        let options = CounterOptions {
            y_rounding: YRounding::Strict,
            ..CounterOptions::default()
        };
        let limits = CounterLimits {
            min_display_value: 5.0,
            max_display_value: 10.0,
            max_gap: 0,
        };
        let mut sharer = RangeSharer::new();
        let axis = compute_y_range(&options, &limits, (5.0, 10.0), &mut sharer);
        assert_eq!(axis.y_min, 0.0);
        assert_eq!(axis.y_max, 10.0);
    }

    #[test]
    fn y_range_viewport_uses_visible_data() {
        let options = CounterOptions {
            y_range: YRange::Viewport,
            y_display: YDisplay::MinMax,
            y_rounding: YRounding::Strict,
            ..CounterOptions::default()
        };
        let limits = CounterLimits {
            min_display_value: -100.0,
            max_display_value: 100.0,
            max_gap: 0,
        };
        let mut sharer = RangeSharer::new();
        let axis = compute_y_range(&options, &limits, (2.0, 4.0), &mut sharer);
        assert_eq!((axis.y_min, axis.y_max), (2.0, 4.0));
        assert_eq!(axis.label, "min - max ");
    }

    #[test]
    fn y_overrides_only_extend() {
        let options = CounterOptions {
            y_rounding: YRounding::Strict,
            y_override_maximum: Some(100.0),
            y_override_minimum: Some(-10.0),
            ..CounterOptions::default()
        };
        let limits = CounterLimits {
            min_display_value: 0.0,
            max_display_value: 40.0,
            max_gap: 0,
        };
        let mut sharer = RangeSharer::new();
        let axis = compute_y_range(&options, &limits, (0.0, 40.0), &mut sharer);
        assert_eq!((axis.y_min, axis.y_max), (-10.0, 100.0));
    }

    #[test]
    fn shared_ranges_union_monotonically() {
        let options = CounterOptions {
            y_rounding: YRounding::Strict,
            y_range_sharing_key: Some("mem".to_string()),
            ..CounterOptions::default()
        };
        let mut sharer = RangeSharer::new();

        let a = sharer.share(&options, (0.0, 10.0));
        assert_eq!(a, (0.0, 10.0));
        let b = sharer.share(&options, (-5.0, 3.0));
        assert_eq!(b, (-5.0, 10.0));
        // A narrower report never shrinks the shared range.
        let c = sharer.share(&options, (0.0, 1.0));
        assert_eq!(c, (-5.0, 10.0));
    }

    #[test]
    fn sharing_can_be_disabled_per_key() {
        let options = CounterOptions {
            y_range_sharing_key: Some("mem".to_string()),
            ..CounterOptions::default()
        };
        let mut sharer = RangeSharer::new();
        sharer.share(&options, (0.0, 100.0));
        sharer.set_enabled("mem", false);
        assert_eq!(sharer.share(&options, (0.0, 1.0)), (0.0, 1.0));
    }

    #[test]
    fn overrides_resolve_field_by_field() {
        let overrides = CounterOptionOverrides {
            y_mode: Some(ValueMode::Rate),
            unit: Some("B".to_string()),
            ..CounterOptionOverrides::default()
        };
        let options = CounterOptions::resolve(&overrides);
        assert_eq!(options.y_mode, ValueMode::Rate);
        assert_eq!(options.unit, "B");
        // Untouched fields keep their defaults.
        assert_eq!(options.y_range, YRange::All);
        assert_eq!(options.y_display, YDisplay::Zero);
    }
}
