//! Placeholder rendering for viewport regions whose data has not arrived.

use std::sync::OnceLock;

use iced::widget::canvas;
use iced::{Color, Point, Size};
use unicode_width::UnicodeWidthStr;

const LOADING_TEXT: &str = "Loading...";
const LOADING_FONT_PX: f32 = 10.0;

/// Estimated pixel width of the loading label. Font metrics are not cheap
/// to query per frame, so this is computed once.
fn loading_label_width() -> f32 {
    static WIDTH: OnceLock<f32> = OnceLock::new();
    *WIDTH.get_or_init(|| {
        // Cell count times an average glyph advance for the label font size.
        LOADING_TEXT.width() as f32 * LOADING_FONT_PX * 0.6
    })
}

/// The up-to-two horizontal bands of `[full_start, full_end)` not covered
/// by `[covered_start, covered_end)`. Returned left to right.
pub fn uncovered_bands(
    full_start: f32,
    full_end: f32,
    covered_start: f32,
    covered_end: f32,
) -> [Option<(f32, f32)>; 2] {
    let covered_start = covered_start.clamp(full_start, full_end);
    let covered_end = covered_end.clamp(covered_start, full_end);

    let left = (covered_start > full_start).then_some((full_start, covered_start));
    let right = (covered_end < full_end).then_some((covered_end, full_end));
    [left, right]
}

/// Paint placeholder bands over every part of `[full_start, full_end)` that
/// `[covered_start, covered_end)` does not cover. The covered region itself
/// is left for the caller to draw.
pub fn checkerboard_except(
    frame: &mut canvas::Frame,
    height: f32,
    full_start: f32,
    full_end: f32,
    covered_start: f32,
    covered_end: f32,
) {
    for band in uncovered_bands(full_start, full_end, covered_start, covered_end)
        .into_iter()
        .flatten()
    {
        paint_band(frame, height, band);
    }
}

/// Paint a single full-height placeholder band.
pub fn checkerboard(frame: &mut canvas::Frame, height: f32, start: f32, end: f32) {
    if end > start {
        paint_band(frame, height, (start, end));
    }
}

fn paint_band(frame: &mut canvas::Frame, height: f32, (start, end): (f32, f32)) {
    let width = end - start;
    frame.fill_rectangle(
        Point::new(start, 0.0),
        Size::new(width, height),
        Color::from_rgba(0.0, 0.0, 0.0, 0.06),
    );

    let label_width = loading_label_width();
    if width >= label_width + 8.0 {
        frame.fill_text(canvas::Text {
            content: LOADING_TEXT.to_string(),
            position: Point::new(
                start + (width - label_width) / 2.0,
                (height - LOADING_FONT_PX) / 2.0,
            ),
            color: Color::from_rgba(0.0, 0.0, 0.0, 0.35),
            size: LOADING_FONT_PX.into(),
            ..Default::default()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_coverage_leaves_two_bands() {
        let bands = uncovered_bands(0.0, 500.0, 100.0, 300.0);
        assert_eq!(bands[0], Some((0.0, 100.0)));
        assert_eq!(bands[1], Some((300.0, 500.0)));
    }

    #[test]
    fn full_coverage_leaves_no_bands() {
        let bands = uncovered_bands(0.0, 500.0, 0.0, 500.0);
        assert_eq!(bands, [None, None]);
    }

    #[test]
    fn coverage_overshooting_the_viewport_is_clamped() {
        let bands = uncovered_bands(0.0, 500.0, -200.0, 900.0);
        assert_eq!(bands, [None, None]);
    }

    #[test]
    fn coverage_on_one_side_leaves_one_band() {
        let bands = uncovered_bands(0.0, 500.0, 0.0, 300.0);
        assert_eq!(bands, [None, Some((300.0, 500.0))]);

        let bands = uncovered_bands(0.0, 500.0, 200.0, 500.0);
        assert_eq!(bands, [Some((0.0, 200.0)), None]);
    }

    #[test]
    fn empty_coverage_leaves_the_whole_viewport() {
        // A degenerate covered range means nothing has been fetched.
        let bands = uncovered_bands(0.0, 500.0, 250.0, 250.0);
        assert_eq!(bands[0], Some((0.0, 250.0)));
        assert_eq!(bands[1], Some((250.0, 500.0)));
    }
}
