//! The counter track: an aggregated min/max/last ribbon over a numeric
//! series, fetched window-by-window through the timeline cache.

use std::sync::{Arc, Mutex};

use iced::widget::canvas;
use iced::{Color, Point, Size};
use log::{debug, warn};
use unicode_width::UnicodeWidthStr;

use crate::cache::{CacheKey, TimelineCache, DEFAULT_CACHE_CAPACITY};
use crate::counter::{
    compute_y_range, CounterData, CounterLimits, CounterOptionOverrides, CounterOptions,
    RangeSharer, ValueMode, YAxisRange,
};
use crate::engine::{CounterId, TrackData, TrackQuery};
use crate::time::TimeNs;
use crate::timeline::{checkerboard, color_from_hsl, TimeScale, Viewport};
use crate::track::{FetchRequest, Track};

// 0.5 keeps the horizontal lines sharp.
const MARGIN_TOP: f32 = 3.5;
const BASE_HEIGHT: f32 = 40.0;

#[derive(Debug, Clone, Copy)]
struct HoverState {
    ts: TimeNs,
    ts_end: Option<TimeNs>,
    last_display_value: f64,
    avg_value: f64,
    count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Pending {
    Limits { generation: u64 },
    Series { generation: u64, key: CacheKey },
}

pub struct CounterTrack {
    title: String,
    counter: CounterId,
    base_overrides: CounterOptionOverrides,
    options: CounterOptions,
    sharer: Arc<Mutex<RangeSharer>>,

    limits: Option<CounterLimits>,
    // The key the resident data was fetched for. Zero until the first
    // fetch lands.
    counters_key: CacheKey,
    data: CounterData,
    cache: TimelineCache<CounterData>,
    axis: Option<YAxisRange>,

    pending: Option<Pending>,
    generation: u64,
    hover: Option<HoverState>,
    mouse: Point,
    alive: bool,
}

impl CounterTrack {
    /// `overrides` are this track's own settings (unit, sharing key);
    /// `defaults` are the app-wide counter preferences. The track keeps
    /// only its own overrides so later preference changes still apply.
    pub fn new(
        title: String,
        counter: CounterId,
        overrides: CounterOptionOverrides,
        defaults: &CounterOptionOverrides,
        sharer: Arc<Mutex<RangeSharer>>,
    ) -> CounterTrack {
        let options = CounterOptions::resolve(&overrides.or(defaults));
        CounterTrack {
            title,
            counter,
            base_overrides: overrides,
            options,
            sharer,
            limits: None,
            counters_key: CacheKey::zero(),
            data: CounterData::default(),
            cache: TimelineCache::new(DEFAULT_CACHE_CAPACITY),
            axis: None,
            pending: None,
            generation: 0,
            hover: None,
            mouse: Point::ORIGIN,
            alive: true,
        }
    }

    pub fn options(&self) -> &CounterOptions {
        &self.options
    }

    /// Drop every derived artefact. Anything cached was computed under the
    /// old options and would silently mislead.
    fn invalidate(&mut self) {
        self.limits = None;
        self.cache.invalidate();
        self.counters_key = CacheKey::zero();
        self.data = CounterData::default();
        self.axis = None;
        self.hover = None;
        self.pending = None;
        self.generation += 1;
    }

    fn recompute_axis(&mut self) {
        let Some(limits) = self.limits else {
            self.axis = None;
            return;
        };
        let mut sharer = self
            .sharer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.axis = Some(compute_y_range(
            &self.options,
            &limits,
            self.data.display_value_range,
            &mut sharer,
        ));
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn unit_suffix(&self) -> String {
        let unit = &self.options.unit;
        match self.options.y_mode {
            ValueMode::Value => format!(" {unit}"),
            ValueMode::Delta => format!(" \u{0394}{unit}"),
            ValueMode::Rate => format!(" \u{0394}{unit}/s"),
        }
    }
}

impl Track for CounterTrack {
    fn title(&self) -> &str {
        &self.title
    }

    fn height(&self) -> f32 {
        if self.options.enlarge {
            BASE_HEIGHT * 4.0
        } else {
            BASE_HEIGHT
        }
    }

    fn on_update(&mut self, viewport: &Viewport) -> Option<FetchRequest> {
        if !self.alive {
            return None;
        }

        // Limits are fetched once per option set and gate the series fetch:
        // the series query window is extended by the largest sample gap.
        let Some(limits) = self.limits else {
            if matches!(self.pending, Some(Pending::Limits { .. })) {
                return None;
            }
            let generation = self.next_generation();
            self.pending = Some(Pending::Limits { generation });
            return Some(FetchRequest {
                query: TrackQuery::CounterLimits {
                    counter: self.counter,
                    mode: self.options.y_mode,
                    log_scale: self.options.log_scale(),
                },
                generation,
            });
        };

        let visible = viewport.visible;
        let raw_key = CacheKey::create(visible.start(), visible.end(), viewport.width_px);
        if raw_key.is_covered_by(&self.counters_key) {
            // Resident data still covers the viewport.
            return None;
        }

        // Over-fetch one page each side so small pans stay resident, then
        // snap onto the canonical bucket ladder.
        let padded = visible.pad(visible.duration());
        let over_key = CacheKey {
            start: padded.start(),
            end: padded.end(),
            bucket_size: raw_key.bucket_size,
        };
        let key = over_key.normalize();
        if !over_key.is_covered_by(&key) {
            panic!("normalization failure: {key} does not cover {over_key}");
        }

        if let Some(cached) = self.cache.lookup(&key).cloned() {
            self.counters_key = key;
            self.data = cached;
            self.recompute_axis();
            return None;
        }

        if matches!(self.pending, Some(Pending::Series { key: pending, .. }) if pending == key) {
            return None;
        }

        let generation = self.next_generation();
        self.pending = Some(Pending::Series { generation, key });
        debug!("counter {:?}: fetching {key}", self.counter);
        Some(FetchRequest {
            query: TrackQuery::CounterSeries {
                counter: self.counter,
                key,
                mode: self.options.y_mode,
                log_scale: self.options.log_scale(),
                max_gap: limits.max_gap,
            },
            generation,
        })
    }

    fn on_data(&mut self, generation: u64, data: TrackData) {
        if !self.alive {
            return;
        }
        match data {
            TrackData::CounterLimits(limits) => {
                if self.pending != Some(Pending::Limits { generation }) {
                    warn!("counter {:?}: dropping stale limits", self.counter);
                    return;
                }
                self.limits = Some(limits);
                self.pending = None;
            }
            TrackData::CounterSeries(series) => {
                let expected = matches!(
                    self.pending,
                    Some(Pending::Series { generation: g, key }) if g == generation && key == series.key
                );
                if !expected {
                    warn!("counter {:?}: dropping stale series {}", self.counter, series.key);
                    return;
                }
                self.cache.insert(series.key, series.data.clone());
                self.counters_key = series.key;
                self.data = series.data;
                self.recompute_axis();
                self.pending = None;
            }
            other => {
                warn!("counter {:?}: unexpected payload {other:?}", self.counter);
            }
        }
    }

    fn on_fetch_error(&mut self, generation: u64) {
        let matches_pending = match self.pending {
            Some(Pending::Limits { generation: g }) => g == generation,
            Some(Pending::Series { generation: g, .. }) => g == generation,
            None => false,
        };
        if matches_pending {
            // Keep whatever is on screen; a later update retries.
            self.pending = None;
        }
    }

    fn render(&self, frame: &mut canvas::Frame, scale: &TimeScale) {
        let Some(axis) = &self.axis else { return };
        if self.data.is_empty() {
            return;
        }
        self.data.assert_consistent();

        let height = self.height();
        let effective_height = height - MARGIN_TOP;
        let end_px = scale.width();
        let y_min = axis.y_min;
        let y_range = if axis.y_range > 0.0 { axis.y_range } else { 1.0 };

        let has_zero = axis.y_min < 0.0 && axis.y_max > 0.0;
        let zero_y = if has_zero {
            effective_height * (axis.y_max / y_range) as f32 + MARGIN_TOP
        } else {
            effective_height + MARGIN_TOP
        };

        // Hue keys off the magnitude of the axis so related counters get
        // related colours.
        let exp = axis.y_max.max(1.0).log10().ceil();
        let exp_capped = (exp - 3.0).min(9.0);
        let hue = (180.0 - (exp_capped * (180.0 / 6.0)).floor()).rem_euclid(360.0) as f32;
        let fill_color = color_from_hsl(hue, 0.45, 0.75);
        let stroke_color = color_from_hsl(hue, 0.45, 0.45);

        let calc_x = |ts: TimeNs| scale.time_to_px(ts).floor();
        let calc_y = |value: f64| {
            MARGIN_TOP + effective_height
                - (((value - y_min) / y_range) * effective_height as f64).round() as f32
        };

        let timestamps = &self.data.timestamps;
        let ribbon = canvas::Path::new(|builder| {
            builder.move_to(Point::new(calc_x(timestamps[0]), zero_y));
            let mut last_drawn_y = zero_y;
            for i in 0..timestamps.len() {
                let x = calc_x(timestamps[i]);
                let min_y = calc_y(self.data.min_display_values[i]);
                let max_y = calc_y(self.data.max_display_values[i]);
                let last_y = calc_y(self.data.last_display_values[i]);

                builder.line_to(Point::new(x, last_drawn_y));
                if min_y != max_y {
                    builder.line_to(Point::new(x, min_y));
                    builder.line_to(Point::new(x, max_y));
                }
                builder.line_to(Point::new(x, last_y));
                last_drawn_y = last_y;
            }
            builder.line_to(Point::new(end_px, last_drawn_y));
            builder.line_to(Point::new(end_px, zero_y));
            builder.close();
        });
        frame.fill(&ribbon, fill_color);
        frame.stroke(
            &ribbon,
            canvas::Stroke::default()
                .with_color(stroke_color)
                .with_width(1.0),
        );

        if has_zero {
            let zero_line = canvas::Path::line(
                Point::new(0.0, zero_y),
                Point::new(end_px, zero_y),
            );
            frame.stroke(
                &zero_line,
                canvas::Stroke {
                    line_dash: canvas::LineDash {
                        segments: &[2.0, 4.0],
                        offset: 0,
                    },
                    ..canvas::Stroke::default()
                        .with_color(color_from_hsl(hue, 0.10, 0.71))
                        .with_width(1.0)
                },
            );
        }

        if let Some(hover) = self.hover {
            let x_start = scale.time_to_px(hover.ts).floor();
            let x_end = hover
                .ts_end
                .map(|ts| scale.time_to_px(ts).floor())
                .unwrap_or(end_px);
            let y = calc_y(hover.last_display_value);

            frame.stroke(
                &canvas::Path::line(Point::new(x_start, y), Point::new(x_end, y)),
                canvas::Stroke::default()
                    .with_color(stroke_color)
                    .with_width(3.0),
            );
            let marker = canvas::Path::circle(Point::new(x_start, y), 3.0);
            frame.fill(&marker, fill_color);
            frame.stroke(
                &marker,
                canvas::Stroke::default()
                    .with_color(stroke_color)
                    .with_width(1.0),
            );

            let mut text = format!("{}{}", hover.avg_value, self.unit_suffix());
            if hover.count > 1 {
                text.push_str(&format!(" (avg of {})", hover.count));
            }
            draw_hover_tooltip(frame, self.mouse, height, &text);
        }

        // The y scale in the top left corner.
        frame.fill_rectangle(
            Point::new(0.0, 0.0),
            Size::new(42.0, 16.0),
            Color::from_rgba(1.0, 1.0, 1.0, 0.6),
        );
        frame.fill_text(canvas::Text {
            content: axis.label.clone(),
            position: Point::new(5.0, 3.0),
            color: Color::from_rgb(0.4, 0.4, 0.4),
            size: 10.0.into(),
            ..Default::default()
        });

        // Flag whatever the fetched window does not cover.
        checkerboard::checkerboard_except(
            frame,
            height,
            0.0,
            end_px,
            scale.time_to_px(self.counters_key.start),
            scale.time_to_px(self.counters_key.end),
        );
    }

    fn on_mouse_move(&mut self, position: Point, scale: &TimeScale) {
        self.mouse = position;
        if self.data.is_empty() {
            self.hover = None;
            return;
        }
        let time = scale.px_to_time(position.x);
        let idx = self.data.timestamps.partition_point(|&ts| ts <= time);
        if idx == 0 {
            self.hover = None;
            return;
        }
        let left = idx - 1;
        self.hover = Some(HoverState {
            ts: self.data.timestamps[left],
            ts_end: self.data.timestamps.get(idx).copied(),
            last_display_value: self.data.last_display_values[left],
            avg_value: self.data.avg_values[left],
            count: self.data.counts[left],
        });
    }

    fn on_mouse_out(&mut self) {
        self.hover = None;
    }

    fn apply_counter_defaults(&mut self, defaults: &CounterOptionOverrides) {
        let merged = self.base_overrides.or(defaults);
        let options = CounterOptions::resolve(&merged);
        if options != self.options {
            self.options = options;
            self.invalidate();
        }
    }

    fn on_destroy(&mut self) {
        self.alive = false;
        self.data = CounterData::default();
        self.cache.invalidate();
    }
}

fn draw_hover_tooltip(frame: &mut canvas::Frame, mouse: Point, track_height: f32, text: &str) {
    const FONT_PX: f32 = 10.0;
    let text_width = text.width() as f32 * FONT_PX * 0.6;
    let box_width = text_width + 8.0;
    let box_height = FONT_PX + 6.0;
    let x = mouse.x + 10.0;
    let y = (mouse.y - box_height - 4.0).clamp(0.0, (track_height - box_height).max(0.0));

    frame.fill_rectangle(
        Point::new(x, y),
        Size::new(box_width, box_height),
        Color::from_rgba(1.0, 1.0, 1.0, 0.9),
    );
    frame.stroke(
        &canvas::Path::rectangle(Point::new(x, y), Size::new(box_width, box_height)),
        canvas::Stroke::default()
            .with_color(Color::from_rgba(0.0, 0.0, 0.0, 0.35))
            .with_width(1.0),
    );
    frame.fill_text(canvas::Text {
        content: text.to_string(),
        position: Point::new(x + 4.0, y + 2.0),
        color: Color::from_rgb(0.2, 0.2, 0.2),
        size: FONT_PX.into(),
        ..Default::default()
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineBuilder, TraceEngine};
    use crate::time::{TimeSpan, NANOS_PER_SEC};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingEngine {
        inner: crate::engine::InMemoryEngine,
        series_calls: AtomicU32,
    }

    impl TraceEngine for CountingEngine {
        fn trace_span(&self) -> TimeSpan {
            self.inner.trace_span()
        }

        fn execute(
            &self,
            query: TrackQuery,
        ) -> Result<TrackData, crate::engine::EngineError> {
            if matches!(query, TrackQuery::CounterSeries { .. }) {
                self.series_calls.fetch_add(1, Ordering::SeqCst);
            }
            self.inner.execute(query)
        }
    }

    fn seconds_span(start: f64, end: f64) -> TimeSpan {
        TimeSpan::new(TimeNs::from_seconds(start), TimeNs::from_seconds(end))
    }

    /// Run update/fetch/deliver cycles until the track settles.
    fn drive(track: &mut CounterTrack, engine: &CountingEngine, viewport: &Viewport) {
        while let Some(request) = track.on_update(viewport) {
            let data = engine.execute(request.query).unwrap();
            track.on_data(request.generation, data);
        }
    }

    fn test_track(counter: CounterId) -> CounterTrack {
        CounterTrack::new(
            "cpu".to_string(),
            counter,
            CounterOptionOverrides::default(),
            &CounterOptionOverrides::default(),
            Arc::new(Mutex::new(RangeSharer::new())),
        )
    }

    #[test]
    fn pan_inside_the_overfetched_window_issues_no_new_fetch() {
        // 1000 samples spread over 10 seconds.
        let mut builder = EngineBuilder::new();
        let samples: Vec<(TimeNs, f64)> = (0..1000)
            .map(|i| {
                (
                    TimeNs::from_raw(i * 10 * NANOS_PER_SEC / 1000),
                    (i % 50) as f64,
                )
            })
            .collect();
        let counter = builder.add_counter(samples);
        let engine = CountingEngine {
            inner: builder.build(),
            series_calls: AtomicU32::new(0),
        };

        let mut track = test_track(counter);

        let viewport = Viewport {
            visible: seconds_span(0.0, 2.0),
            width_px: 500.0,
        };
        drive(&mut track, &engine, &viewport);
        assert_eq!(engine.series_calls.load(Ordering::SeqCst), 1);
        assert!(!track.data.is_empty());
        let buckets_before = track.data.len();
        let key_before = track.counters_key;

        // Panning one second to the right stays inside the over-fetched
        // window, so the same data keeps rendering.
        let panned = Viewport {
            visible: seconds_span(1.0, 3.0),
            width_px: 500.0,
        };
        drive(&mut track, &engine, &panned);
        assert_eq!(engine.series_calls.load(Ordering::SeqCst), 1);
        assert_eq!(track.data.len(), buckets_before);
        assert_eq!(track.counters_key, key_before);
    }

    #[test]
    fn zoom_out_issues_a_new_fetch_and_reuses_the_cache_on_return() {
        let mut builder = EngineBuilder::new();
        let samples: Vec<(TimeNs, f64)> = (0..1000)
            .map(|i| (TimeNs::from_raw(i * 10_000_000), i as f64))
            .collect();
        let counter = builder.add_counter(samples);
        let engine = CountingEngine {
            inner: builder.build(),
            series_calls: AtomicU32::new(0),
        };

        let mut track = test_track(counter);

        let near = Viewport {
            visible: seconds_span(0.0, 1.0),
            width_px: 500.0,
        };
        drive(&mut track, &engine, &near);
        assert_eq!(engine.series_calls.load(Ordering::SeqCst), 1);

        let far = Viewport {
            visible: seconds_span(0.0, 8.0),
            width_px: 500.0,
        };
        drive(&mut track, &engine, &far);
        assert_eq!(engine.series_calls.load(Ordering::SeqCst), 2);

        // Returning to the first window is served from the cache.
        drive(&mut track, &engine, &near);
        assert_eq!(engine.series_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stale_series_delivery_is_discarded() {
        let mut builder = EngineBuilder::new();
        let counter =
            builder.add_counter((0..100).map(|i| (TimeNs::from_raw(i * 1_000), 1.0)).collect());
        let engine = CountingEngine {
            inner: builder.build(),
            series_calls: AtomicU32::new(0),
        };

        let mut track = test_track(counter);
        let viewport = Viewport {
            visible: TimeSpan::new(TimeNs::ZERO, TimeNs::from_raw(100_000)),
            width_px: 100.0,
        };

        // Resolve limits first.
        let limits_request = track.on_update(&viewport).unwrap();
        track.on_data(
            limits_request.generation,
            engine.execute(limits_request.query).unwrap(),
        );

        // Issue a series fetch, then supersede it with new options before
        // it lands.
        let first = track.on_update(&viewport).unwrap();
        let first_payload = engine.execute(first.query).unwrap();
        track.apply_counter_defaults(&CounterOptionOverrides {
            y_mode: Some(ValueMode::Delta),
            ..CounterOptionOverrides::default()
        });
        track.on_data(first.generation, first_payload);

        // The stale payload must not have become resident.
        assert!(track.data.is_empty());
        assert_eq!(track.counters_key, CacheKey::zero());
    }

    #[test]
    fn option_changes_invalidate_limits_and_cache() {
        let mut builder = EngineBuilder::new();
        let counter =
            builder.add_counter((0..100).map(|i| (TimeNs::from_raw(i * 1_000), 2.0)).collect());
        let engine = CountingEngine {
            inner: builder.build(),
            series_calls: AtomicU32::new(0),
        };

        let mut track = test_track(counter);
        let viewport = Viewport {
            visible: TimeSpan::new(TimeNs::ZERO, TimeNs::from_raw(100_000)),
            width_px: 100.0,
        };
        drive(&mut track, &engine, &viewport);
        assert!(track.limits.is_some());

        track.apply_counter_defaults(&CounterOptionOverrides {
            y_mode: Some(ValueMode::Rate),
            ..CounterOptionOverrides::default()
        });
        assert!(track.limits.is_none());
        assert!(track.cache.is_empty());
        assert!(track.data.is_empty());

        // The track recovers by refetching under the new options.
        drive(&mut track, &engine, &viewport);
        assert!(track.limits.is_some());
        assert!(!track.data.is_empty());
    }

    #[test]
    fn destroyed_track_ignores_late_deliveries() {
        let mut builder = EngineBuilder::new();
        let counter = builder.add_counter(vec![(TimeNs::ZERO, 1.0)]);
        let engine = CountingEngine {
            inner: builder.build(),
            series_calls: AtomicU32::new(0),
        };

        let mut track = test_track(counter);
        let viewport = Viewport {
            visible: TimeSpan::new(TimeNs::ZERO, TimeNs::from_raw(1_000)),
            width_px: 100.0,
        };
        let request = track.on_update(&viewport).unwrap();
        let payload = engine.execute(request.query).unwrap();

        track.on_destroy();
        track.on_data(request.generation, payload);
        assert!(track.limits.is_none());
        assert!(track.on_update(&viewport).is_none());
    }
}
