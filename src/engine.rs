//! The data-access boundary between tracks and the trace store.
//!
//! Tracks never touch trace tables directly. They describe what they need
//! as a [`TrackQuery`] and get back a columnar [`TrackData`] payload. The
//! queries are deliberately narrow: limits, an aggregated counter window, a
//! slice window, or the whole-trace overview.

use intervaltree::IntervalTree;
use thiserror::Error;

use crate::cache::CacheKey;
use crate::counter::{
    self, CounterData, CounterLimits, ValueMode,
};
use crate::symbols::{LabelPool, Symbol};
use crate::time::{DurationNs, TimeNs, TimeSpan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CounterId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SliceTrackId(pub u32);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown counter track {0:?}")]
    UnknownCounter(CounterId),
    #[error("unknown slice track {0:?}")]
    UnknownSliceTrack(SliceTrackId),
}

/// A request against the engine. Every variant names exactly the inputs the
/// engine needs; there is no free-form query surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackQuery {
    /// Trace-wide display-value extremes and the largest sample gap for a
    /// counter under the given mode.
    CounterLimits {
        counter: CounterId,
        mode: ValueMode,
        log_scale: bool,
    },
    /// Aggregated counter buckets for a normalized window. `max_gap`
    /// extends the window start so the sample preceding it contributes.
    CounterSeries {
        counter: CounterId,
        key: CacheKey,
        mode: ValueMode,
        log_scale: bool,
        max_gap: DurationNs,
    },
    /// Slices intersecting `span`, dropping those narrower than
    /// `resolution`.
    Slices {
        track: SliceTrackId,
        span: TimeSpan,
        resolution: DurationNs,
    },
    /// Whole-trace slice density at a fixed bucket count.
    Overview { buckets: usize },
}

/// A completed query. Variants pair one-to-one with [`TrackQuery`].
#[derive(Debug, Clone)]
pub enum TrackData {
    CounterLimits(CounterLimits),
    CounterSeries(CounterSeries),
    Slices(SliceData),
    Overview(OverviewData),
}

/// Aggregated counter buckets tagged with the normalized key they were
/// fetched for.
#[derive(Debug, Clone)]
pub struct CounterSeries {
    pub key: CacheKey,
    pub data: CounterData,
}

/// Columnar slice rows for one fetched window.
#[derive(Debug, Clone)]
pub struct SliceData {
    /// The window the rows were fetched for, used to checkerboard the
    /// remainder of the viewport.
    pub window: TimeSpan,
    pub starts: Vec<TimeNs>,
    pub durs: Vec<DurationNs>,
    pub depths: Vec<u32>,
    pub labels: Vec<String>,
}

impl SliceData {
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }
}

/// Slice-start density over the whole trace, for the overview strip.
#[derive(Debug, Clone, Default)]
pub struct OverviewData {
    pub counts: Vec<u32>,
    pub max_count: u32,
}

/// The engine contract consumed by tracks.
///
/// Implementations are expected to be cheap to share (`Arc`) and safe to
/// call from worker tasks. Queries are synchronous; the asynchrony lives in
/// the task layer that schedules them.
pub trait TraceEngine: Send + Sync {
    fn trace_span(&self) -> TimeSpan;
    fn execute(&self, query: TrackQuery) -> Result<TrackData, EngineError>;
}

struct CounterTable {
    ts: Vec<TimeNs>,
    values: Vec<f64>,
}

struct SliceTable {
    tree: IntervalTree<i64, usize>,
    starts: Vec<TimeNs>,
    durs: Vec<DurationNs>,
    depths: Vec<u32>,
    labels: Vec<Symbol>,
}

/// One ingested slice row, before the table is frozen.
#[derive(Debug, Clone)]
pub struct SliceRow {
    pub start: TimeNs,
    pub dur: DurationNs,
    pub depth: u32,
    pub label: String,
}

/// Builds an [`InMemoryEngine`] during ingestion. Tables are sorted and
/// indexed once here; the finished engine is immutable.
#[derive(Default)]
pub struct EngineBuilder {
    pool: LabelPool,
    counters: Vec<CounterTable>,
    slice_tracks: Vec<SliceTable>,
    min_ts: Option<TimeNs>,
    max_ts: Option<TimeNs>,
}

impl EngineBuilder {
    pub fn new() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn add_counter(&mut self, mut samples: Vec<(TimeNs, f64)>) -> CounterId {
        samples.sort_by_key(|(ts, _)| *ts);
        if let (Some(first), Some(last)) = (samples.first(), samples.last()) {
            self.extend_span(first.0, last.0);
        }
        let (ts, values) = samples.into_iter().unzip();
        self.counters.push(CounterTable { ts, values });
        CounterId(self.counters.len() as u32 - 1)
    }

    pub fn add_slice_track(&mut self, mut rows: Vec<SliceRow>) -> SliceTrackId {
        rows.sort_by_key(|row| row.start);

        let mut starts = Vec::with_capacity(rows.len());
        let mut durs = Vec::with_capacity(rows.len());
        let mut depths = Vec::with_capacity(rows.len());
        let mut labels = Vec::with_capacity(rows.len());

        for row in &rows {
            self.extend_span(row.start, row.start.add(row.dur.max(0)));
            starts.push(row.start);
            durs.push(row.dur);
            depths.push(row.depth);
            labels.push(self.pool.intern(&row.label));
        }

        let tree: IntervalTree<i64, usize> = rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                // Instant rows still need a non-empty range to be indexable.
                let start = row.start.raw();
                let end = start + row.dur.max(1);
                intervaltree::Element {
                    range: start..end,
                    value: index,
                }
            })
            .collect();

        self.slice_tracks.push(SliceTable {
            tree,
            starts,
            durs,
            depths,
            labels,
        });
        SliceTrackId(self.slice_tracks.len() as u32 - 1)
    }

    fn extend_span(&mut self, start: TimeNs, end: TimeNs) {
        self.min_ts = Some(match self.min_ts {
            Some(min) => min.min(start),
            None => start,
        });
        self.max_ts = Some(match self.max_ts {
            Some(max) => max.max(end),
            None => end,
        });
    }

    pub fn build(self) -> InMemoryEngine {
        let span = match (self.min_ts, self.max_ts) {
            (Some(min), Some(max)) => TimeSpan::new(min, max),
            _ => TimeSpan::ZERO,
        };
        InMemoryEngine {
            pool: self.pool,
            counters: self.counters,
            slice_tracks: self.slice_tracks,
            span,
        }
    }
}

/// The in-process trace store. Immutable once built.
pub struct InMemoryEngine {
    pool: LabelPool,
    counters: Vec<CounterTable>,
    slice_tracks: Vec<SliceTable>,
    span: TimeSpan,
}

impl InMemoryEngine {
    fn counter(&self, id: CounterId) -> Result<&CounterTable, EngineError> {
        self.counters
            .get(id.0 as usize)
            .ok_or(EngineError::UnknownCounter(id))
    }

    fn slice_track(&self, id: SliceTrackId) -> Result<&SliceTable, EngineError> {
        self.slice_tracks
            .get(id.0 as usize)
            .ok_or(EngineError::UnknownSliceTrack(id))
    }

    fn counter_limits(
        &self,
        id: CounterId,
        mode: ValueMode,
        log_scale: bool,
    ) -> Result<CounterLimits, EngineError> {
        let table = self.counter(id)?;
        Ok(counter::compute_limits(
            &table.ts,
            &table.values,
            mode,
            log_scale,
        ))
    }

    fn counter_series(
        &self,
        id: CounterId,
        key: CacheKey,
        mode: ValueMode,
        log_scale: bool,
        max_gap: DurationNs,
    ) -> Result<CounterSeries, EngineError> {
        let table = self.counter(id)?;

        // Mode values look one sample ahead, so derive them over the whole
        // table before restricting to the window.
        let mode_vals = counter::mode_values(&table.ts, &table.values, mode);
        let display = counter::display_values(&mode_vals, log_scale);

        let window_start = key.start.sub(max_gap.max(0));
        let lo = table.ts.partition_point(|&ts| ts < window_start);
        let hi = table.ts.partition_point(|&ts| ts <= key.end);

        let data = counter::aggregate(
            &table.ts[lo..hi],
            &mode_vals[lo..hi],
            &display[lo..hi],
            key.bucket_size,
        );
        Ok(CounterSeries { key, data })
    }

    fn slices(
        &self,
        id: SliceTrackId,
        span: TimeSpan,
        resolution: DurationNs,
    ) -> Result<SliceData, EngineError> {
        let table = self.slice_track(id)?;
        let resolution = resolution.max(0);

        let mut indices: Vec<usize> = table
            .tree
            .query(span.start().raw()..span.end().raw())
            .map(|element| element.value)
            .filter(|&index| table.durs[index] >= resolution)
            .collect();
        indices.sort_unstable();

        let mut data = SliceData {
            window: span,
            starts: Vec::with_capacity(indices.len()),
            durs: Vec::with_capacity(indices.len()),
            depths: Vec::with_capacity(indices.len()),
            labels: Vec::with_capacity(indices.len()),
        };
        for index in indices {
            data.starts.push(table.starts[index]);
            data.durs.push(table.durs[index]);
            data.depths.push(table.depths[index]);
            data.labels
                .push(self.pool.resolve(table.labels[index]).to_string());
        }
        Ok(data)
    }

    fn overview(&self, buckets: usize) -> OverviewData {
        let buckets = buckets.max(1);
        let mut counts = vec![0u32; buckets];
        let duration = self.span.duration();
        if duration <= 0 {
            return OverviewData {
                counts,
                max_count: 0,
            };
        }

        for table in &self.slice_tracks {
            for &start in &table.starts {
                let offset = start.diff(self.span.start());
                let index = ((offset as u128 * buckets as u128) / duration as u128) as usize;
                counts[index.min(buckets - 1)] += 1;
            }
        }

        let max_count = counts.iter().copied().max().unwrap_or(0);
        OverviewData { counts, max_count }
    }
}

impl TraceEngine for InMemoryEngine {
    fn trace_span(&self) -> TimeSpan {
        self.span
    }

    fn execute(&self, query: TrackQuery) -> Result<TrackData, EngineError> {
        match query {
            TrackQuery::CounterLimits {
                counter,
                mode,
                log_scale,
            } => Ok(TrackData::CounterLimits(self.counter_limits(
                counter, mode, log_scale,
            )?)),
            TrackQuery::CounterSeries {
                counter,
                key,
                mode,
                log_scale,
                max_gap,
            } => Ok(TrackData::CounterSeries(self.counter_series(
                counter, key, mode, log_scale, max_gap,
            )?)),
            TrackQuery::Slices {
                track,
                span,
                resolution,
            } => Ok(TrackData::Slices(self.slices(track, span, resolution)?)),
            TrackQuery::Overview { buckets } => Ok(TrackData::Overview(self.overview(buckets))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(raw: i64) -> TimeNs {
        TimeNs::from_raw(raw)
    }

    fn engine_with_counter(samples: Vec<(TimeNs, f64)>) -> (InMemoryEngine, CounterId) {
        let mut builder = EngineBuilder::new();
        let id = builder.add_counter(samples);
        (builder.build(), id)
    }

    #[test]
    fn counter_limits_through_the_engine() {
        let (engine, id) = engine_with_counter(vec![
            (t(0), 5.0),
            (t(1_000), 1.0),
            (t(4_000), 9.0),
        ]);
        let TrackData::CounterLimits(limits) = engine
            .execute(TrackQuery::CounterLimits {
                counter: id,
                mode: ValueMode::Value,
                log_scale: false,
            })
            .unwrap()
        else {
            panic!("expected limits");
        };
        assert_eq!(limits.min_display_value, 1.0);
        assert_eq!(limits.max_display_value, 9.0);
        assert_eq!(limits.max_gap, 3_000);
    }

    #[test]
    fn counter_series_respects_the_window() {
        let samples: Vec<(TimeNs, f64)> =
            (0..100).map(|i| (t(i * 1_000), i as f64)).collect();
        let (engine, id) = engine_with_counter(samples);

        let key = CacheKey {
            start: t(10_000),
            end: t(20_000),
            bucket_size: 1_000,
        };
        let TrackData::CounterSeries(series) = engine
            .execute(TrackQuery::CounterSeries {
                counter: id,
                key,
                mode: ValueMode::Value,
                log_scale: false,
                max_gap: 1_000,
            })
            .unwrap()
        else {
            panic!("expected series");
        };

        assert_eq!(series.key, key);
        // Window start is extended one max_gap to the left, so ts 9000
        // through 20000 inclusive contribute.
        assert_eq!(series.data.len(), 12);
        assert!(series.data.timestamps.first().unwrap().raw() >= 9_000);
    }

    #[test]
    fn unknown_counter_is_an_error() {
        let (engine, _) = engine_with_counter(vec![(t(0), 1.0)]);
        let result = engine.execute(TrackQuery::CounterLimits {
            counter: CounterId(42),
            mode: ValueMode::Value,
            log_scale: false,
        });
        assert!(matches!(result, Err(EngineError::UnknownCounter(_))));
    }

    #[test]
    fn slice_query_filters_by_span_and_resolution() {
        let mut builder = EngineBuilder::new();
        let id = builder.add_slice_track(vec![
            SliceRow {
                start: t(0),
                dur: 10_000,
                depth: 0,
                label: "long".to_string(),
            },
            SliceRow {
                start: t(2_000),
                dur: 10,
                depth: 1,
                label: "tiny".to_string(),
            },
            SliceRow {
                start: t(50_000),
                dur: 5_000,
                depth: 0,
                label: "elsewhere".to_string(),
            },
        ]);
        let engine = builder.build();

        let TrackData::Slices(data) = engine
            .execute(TrackQuery::Slices {
                track: id,
                span: TimeSpan::new(t(0), t(20_000)),
                resolution: 100,
            })
            .unwrap()
        else {
            panic!("expected slices");
        };

        // The tiny slice is below resolution and the far slice is outside
        // the window.
        assert_eq!(data.len(), 1);
        assert_eq!(data.labels[0], "long");
        assert_eq!(data.window, TimeSpan::new(t(0), t(20_000)));
    }

    #[test]
    fn overview_counts_slice_starts() {
        let mut builder = EngineBuilder::new();
        builder.add_slice_track(vec![
            SliceRow {
                start: t(0),
                dur: 100,
                depth: 0,
                label: "a".to_string(),
            },
            SliceRow {
                start: t(10),
                dur: 100,
                depth: 1,
                label: "b".to_string(),
            },
            SliceRow {
                start: t(9_000),
                dur: 500,
                depth: 0,
                label: "c".to_string(),
            },
        ]);
        let engine = builder.build();

        let TrackData::Overview(overview) = engine
            .execute(TrackQuery::Overview { buckets: 10 })
            .unwrap()
        else {
            panic!("expected overview");
        };

        assert_eq!(overview.counts.len(), 10);
        assert_eq!(overview.counts.iter().sum::<u32>(), 3);
        assert_eq!(overview.max_count, 2);
    }

    #[test]
    fn empty_engine_has_a_zero_span() {
        let engine = EngineBuilder::new().build();
        assert_eq!(engine.trace_span(), TimeSpan::ZERO);
    }
}
