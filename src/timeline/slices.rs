//! Depth-stacked slice tracks, one per thread.

use iced::widget::canvas;
use iced::{Color, Point, Rectangle};
use log::warn;

use crate::engine::{SliceTrackId, TrackData, TrackQuery};
use crate::fetcher::TimelineFetcher;
use crate::time::{DurationNs, TimeNs, TimeSpan};
use crate::timeline::{
    checkerboard, color_from_label, TimeScale, Viewport, EVENT_LEFT_PADDING, LANE_HEIGHT,
};
use crate::track::{FetchRequest, SliceDetails, Track, TrackAction};

use crate::engine::SliceData;

const TRACK_PADDING: f32 = 4.0;

pub struct SliceTrack {
    title: String,
    track: SliceTrackId,
    max_depth: u32,
    collapsed: bool,
    fetcher: TimelineFetcher<SliceData>,
    hovered: Option<usize>,
    selected: Option<(TimeNs, DurationNs, u32)>,
}

impl SliceTrack {
    pub fn new(title: String, track: SliceTrackId, max_depth: u32) -> SliceTrack {
        SliceTrack {
            title,
            track,
            max_depth,
            collapsed: false,
            fetcher: TimelineFetcher::new(),
            hovered: None,
            selected: None,
        }
    }

    fn lane_count(&self) -> u32 {
        if self.collapsed {
            1
        } else {
            self.max_depth + 1
        }
    }

    fn slice_rect(&self, data: &SliceData, index: usize, scale: &TimeScale) -> Rectangle {
        let x = scale.time_to_px(data.starts[index]);
        let width = scale.duration_to_px(data.durs[index]).max(1.0);
        let y = data.depths[index] as f32 * LANE_HEIGHT + 1.0;
        Rectangle {
            x,
            y,
            width,
            height: LANE_HEIGHT - 2.0,
        }
    }

    fn find_slice_at(&self, position: Point, scale: &TimeScale) -> Option<usize> {
        let data = self.fetcher.data()?;
        for index in 0..data.len() {
            if self.collapsed && data.depths[index] > 0 {
                continue;
            }
            if self.slice_rect(data, index, scale).contains(position) {
                return Some(index);
            }
        }
        None
    }

    fn details(&self, index: usize) -> Option<SliceDetails> {
        let data = self.fetcher.data()?;
        Some(SliceDetails {
            track_title: self.title.clone(),
            label: data.labels[index].clone(),
            start: data.starts[index],
            dur: data.durs[index],
            depth: data.depths[index],
        })
    }
}

impl Track for SliceTrack {
    fn title(&self) -> &str {
        &self.title
    }

    fn height(&self) -> f32 {
        self.lane_count() as f32 * LANE_HEIGHT + TRACK_PADDING
    }

    fn supports_collapse(&self) -> bool {
        true
    }

    fn is_collapsed(&self) -> bool {
        self.collapsed
    }

    fn toggle_collapsed(&mut self) {
        self.collapsed = !self.collapsed;
    }

    fn on_update(&mut self, viewport: &Viewport) -> Option<FetchRequest> {
        let window = self
            .fetcher
            .request(viewport.visible, viewport.resolution())?;
        Some(FetchRequest {
            query: TrackQuery::Slices {
                track: self.track,
                span: window.span,
                resolution: window.resolution,
            },
            generation: window.generation,
        })
    }

    fn on_data(&mut self, generation: u64, data: TrackData) {
        match data {
            TrackData::Slices(slices) => {
                self.fetcher.deliver(generation, slices);
            }
            other => {
                warn!("slice track {:?}: unexpected payload {other:?}", self.track);
            }
        }
    }

    fn on_fetch_error(&mut self, _generation: u64) {
        // Keep rendering resident slices; forget the recorded window so the
        // next update retries.
        self.fetcher.invalidate();
    }

    fn render(&self, frame: &mut canvas::Frame, scale: &TimeScale) {
        let Some(data) = self.fetcher.data() else {
            checkerboard::checkerboard(frame, self.height(), 0.0, scale.width());
            return;
        };

        for index in 0..data.len() {
            if self.collapsed && data.depths[index] > 0 {
                continue;
            }
            let rect = self.slice_rect(data, index, scale);
            if rect.x + rect.width < 0.0 || rect.x > scale.width() {
                continue;
            }

            let label = &data.labels[index];
            draw_slice_rect(frame, rect, color_from_label(label), label);
        }

        if let Some(index) = self.hovered {
            if index < data.len() && (!self.collapsed || data.depths[index] == 0) {
                let rect = self.slice_rect(data, index, scale);
                frame.stroke(
                    &canvas::Path::rectangle(rect.position(), rect.size()),
                    canvas::Stroke::default()
                        .with_color(Color::from_rgba(0.0, 0.0, 0.0, 0.3))
                        .with_width(1.0),
                );
            }
        }

        if let Some((start, dur, depth)) = self.selected {
            if !self.collapsed || depth == 0 {
                let rect = Rectangle {
                    x: scale.time_to_px(start),
                    y: depth as f32 * LANE_HEIGHT + 1.0,
                    width: scale.duration_to_px(dur).max(1.0),
                    height: LANE_HEIGHT - 2.0,
                };
                frame.stroke(
                    &canvas::Path::rectangle(rect.position(), rect.size()),
                    canvas::Stroke::default()
                        .with_color(Color::from_rgb(0.0, 0.4, 0.8))
                        .with_width(2.0),
                );
            }
        }

        // Flag the part of the viewport the fetched window does not cover.
        checkerboard::checkerboard_except(
            frame,
            self.height(),
            0.0,
            scale.width(),
            scale.time_to_px(data.window.start()),
            scale.time_to_px(data.window.end()),
        );
    }

    fn on_mouse_move(&mut self, position: Point, scale: &TimeScale) {
        self.hovered = self.find_slice_at(position, scale);
    }

    fn on_mouse_out(&mut self) {
        self.hovered = None;
    }

    fn on_mouse_click(&mut self, position: Point, scale: &TimeScale) -> Option<TrackAction> {
        let index = self.find_slice_at(position, scale)?;
        let details = self.details(index)?;
        self.selected = Some((details.start, details.dur, details.depth));
        Some(TrackAction::SelectSlice(details))
    }

    fn on_double_click(&mut self, position: Point, scale: &TimeScale) -> Option<TrackAction> {
        let index = self.find_slice_at(position, scale)?;
        let data = self.fetcher.data()?;
        let start = data.starts[index];
        let end = start.add(data.durs[index].max(1));
        let padding = (data.durs[index] / 10).max(1_000);
        Some(TrackAction::ZoomTo(TimeSpan::new(start, end).pad(padding)))
    }

    fn on_destroy(&mut self) {
        self.fetcher.dispose();
        self.hovered = None;
        self.selected = None;
    }
}

fn draw_slice_rect(frame: &mut canvas::Frame, rect: Rectangle, color: Color, label: &str) {
    frame.fill_rectangle(rect.position(), rect.size(), color);
    frame.stroke(
        &canvas::Path::rectangle(rect.position(), rect.size()),
        canvas::Stroke::default()
            .with_color(Color::from_rgba(0.0, 0.0, 0.0, 0.2))
            .with_width(1.0),
    );

    if rect.width > 20.0 {
        // Draw the full label and let the clip region crop overflowing
        // glyphs at the rectangle boundary.
        frame.with_clip(
            Rectangle {
                x: rect.x + 1.0,
                y: rect.y + 1.0,
                width: rect.width - 2.0,
                height: rect.height - 2.0,
            },
            |frame| {
                frame.fill_text(canvas::Text {
                    content: label.to_string(),
                    position: Point::new(EVENT_LEFT_PADDING + 1.0, 1.0),
                    color: Color::from_rgb(0.2, 0.2, 0.2),
                    size: 12.0.into(),
                    ..Default::default()
                });
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineBuilder, SliceRow, TraceEngine};

    fn t(raw: i64) -> TimeNs {
        TimeNs::from_raw(raw)
    }

    fn build_track() -> (crate::engine::InMemoryEngine, SliceTrack) {
        let mut builder = EngineBuilder::new();
        let id = builder.add_slice_track(vec![
            SliceRow {
                start: t(0),
                dur: 500_000,
                depth: 0,
                label: "parse".to_string(),
            },
            SliceRow {
                start: t(100_000),
                dur: 200_000,
                depth: 1,
                label: "lex".to_string(),
            },
        ]);
        let engine = builder.build();
        let track = SliceTrack::new("thread 1".to_string(), id, 1);
        (engine, track)
    }

    #[test]
    fn update_fetch_deliver_round_trip() {
        let (engine, mut track) = build_track();
        let viewport = Viewport {
            visible: TimeSpan::new(t(0), t(500_000)),
            width_px: 500.0,
        };

        let request = track.on_update(&viewport).unwrap();
        let data = engine.execute(request.query).unwrap();
        track.on_data(request.generation, data);

        let resident = track.fetcher.data().unwrap();
        assert_eq!(resident.len(), 2);

        // A same-duration pan inside the over-fetched span needs no new
        // fetch.
        let panned = Viewport {
            visible: TimeSpan::new(t(200_000), t(700_000)),
            width_px: 500.0,
        };
        assert!(track.on_update(&panned).is_none());
    }

    #[test]
    fn collapse_halves_the_height() {
        let (_, mut track) = build_track();
        let expanded = track.height();
        track.toggle_collapsed();
        assert!(track.is_collapsed());
        assert!(track.height() < expanded);
    }

    #[test]
    fn click_selects_the_slice_under_the_cursor() {
        let (engine, mut track) = build_track();
        let viewport = Viewport {
            visible: TimeSpan::new(t(0), t(500_000)),
            width_px: 500.0,
        };
        let request = track.on_update(&viewport).unwrap();
        track.on_data(request.generation, engine.execute(request.query).unwrap());

        let scale = viewport.scale();
        // Depth 1 lane, inside the nested slice.
        let position = Point::new(scale.time_to_px(t(200_000)), LANE_HEIGHT + 5.0);
        let action = track.on_mouse_click(position, &scale);
        match action {
            Some(TrackAction::SelectSlice(details)) => {
                assert_eq!(details.label, "lex");
                assert_eq!(details.depth, 1);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn double_click_zooms_to_the_slice() {
        let (engine, mut track) = build_track();
        let viewport = Viewport {
            visible: TimeSpan::new(t(0), t(500_000)),
            width_px: 500.0,
        };
        let request = track.on_update(&viewport).unwrap();
        track.on_data(request.generation, engine.execute(request.query).unwrap());

        let scale = viewport.scale();
        let position = Point::new(scale.time_to_px(t(250_000)), 5.0);
        match track.on_double_click(position, &scale) {
            Some(TrackAction::ZoomTo(span)) => {
                assert!(span.contains(t(0)));
                assert!(span.end() >= t(500_000));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }
}
