//! Shared view-state helpers for the timeline: the visible viewport, the
//! time-to-pixel scale and lane geometry.

pub mod checkerboard;
pub mod counter;
pub mod header;
pub mod mini_timeline;
pub mod shell;
pub mod slices;
pub mod ticks;
pub mod tracks;

use iced::Color;

use crate::time::{DurationNs, TimeNs, TimeSpan};

pub const LANE_HEIGHT: f32 = 20.0;
pub const LANE_SPACING: f32 = 5.0;
pub const TRACK_SHELL_WIDTH: f32 = 200.0;
pub const HEADER_HEIGHT: f32 = 45.0;
pub const MINI_TIMELINE_HEIGHT: f32 = 48.0;
pub const EVENT_LEFT_PADDING: f32 = 2.0;
pub const DRAG_THRESHOLD: f32 = 4.0;

/// The currently visible window and its width on screen. Shared by every
/// track's update pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub visible: TimeSpan,
    pub width_px: f32,
}

impl Viewport {
    /// Duration covered by one pixel, floored at 1ns.
    pub fn resolution(&self) -> DurationNs {
        (self.visible.duration() / self.width_px.max(1.0) as i64).max(1)
    }

    pub fn scale(&self) -> TimeScale {
        TimeScale::new(self.visible, self.width_px)
    }
}

/// Maps trace time to horizontal pixels over the visible span.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeScale {
    span: TimeSpan,
    width_px: f32,
}

impl TimeScale {
    pub fn new(span: TimeSpan, width_px: f32) -> TimeScale {
        TimeScale {
            span,
            width_px: width_px.max(1.0),
        }
    }

    pub fn span(&self) -> TimeSpan {
        self.span
    }

    pub fn width(&self) -> f32 {
        self.width_px
    }

    pub fn time_to_px(&self, t: TimeNs) -> f32 {
        let duration = self.span.duration().max(1);
        (t.diff(self.span.start()) as f64 / duration as f64 * self.width_px as f64) as f32
    }

    pub fn px_to_time(&self, x: f32) -> TimeNs {
        let duration = self.span.duration();
        let offset = (x as f64 / self.width_px as f64 * duration as f64) as i64;
        self.span.start().add(offset)
    }

    pub fn duration_to_px(&self, d: DurationNs) -> f32 {
        let duration = self.span.duration().max(1);
        (d as f64 / duration as f64 * self.width_px as f64) as f32
    }
}

/// Stable colour for a slice label.
pub fn color_from_label(label: &str) -> Color {
    let mut hash = 0u64;
    for c in label.chars() {
        hash = hash.wrapping_add(c as u64);
        hash = hash.wrapping_mul(0x517cc1b727220a95);
    }

    let r = ((hash >> 16) & 0xFF) as f32 / 255.0;
    let g = ((hash >> 8) & 0xFF) as f32 / 255.0;
    let b = (hash & 0xFF) as f32 / 255.0;

    Color::from_rgb(0.3 + r * 0.4, 0.3 + g * 0.4, 0.3 + b * 0.4)
}

/// HSL to RGB, with hue in degrees and saturation/lightness in `0..=1`.
pub fn color_from_hsl(hue: f32, saturation: f32, lightness: f32) -> Color {
    let h = hue.rem_euclid(360.0) / 60.0;
    let c = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let x = c * (1.0 - (h.rem_euclid(2.0) - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = lightness - c / 2.0;
    Color::from_rgb(r + m, g + m, b + m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_round_trips_pixels() {
        let span = TimeSpan::new(TimeNs::from_raw(1_000), TimeNs::from_raw(11_000));
        let scale = TimeScale::new(span, 500.0);

        assert_eq!(scale.time_to_px(TimeNs::from_raw(1_000)), 0.0);
        assert_eq!(scale.time_to_px(TimeNs::from_raw(11_000)), 500.0);
        assert_eq!(scale.time_to_px(TimeNs::from_raw(6_000)), 250.0);
        assert_eq!(scale.px_to_time(250.0).raw(), 6_000);
        assert_eq!(scale.duration_to_px(2_000), 100.0);
    }

    #[test]
    fn viewport_resolution_is_at_least_one_nanosecond() {
        let viewport = Viewport {
            visible: TimeSpan::new(TimeNs::from_raw(0), TimeNs::from_raw(100)),
            width_px: 1_000.0,
        };
        assert_eq!(viewport.resolution(), 1);
    }
}
