//! The lifecycle contract every timeline track implements.
//!
//! Tracks are driven by the app in three phases per frame: an update pass
//! that may emit a fetch request for the current viewport, data delivery
//! when a fetch completes, and a synchronous render pass that paints
//! whatever is resident, stale or partial included.

use iced::widget::canvas;
use iced::Point;

use crate::counter::CounterOptionOverrides;
use crate::engine::{TrackData, TrackQuery};
use crate::time::{DurationNs, TimeNs, TimeSpan};
use crate::timeline::{TimeScale, Viewport};

/// A query the app should run against the engine on behalf of a track.
/// The generation must be echoed back on delivery so the track can discard
/// results a newer request has superseded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchRequest {
    pub query: TrackQuery,
    pub generation: u64,
}

/// Details of a selected slice, shown in the details panel.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceDetails {
    pub track_title: String,
    pub label: String,
    pub start: TimeNs,
    pub dur: DurationNs,
    pub depth: u32,
}

/// What a pointer interaction asks the app to do.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackAction {
    SelectSlice(SliceDetails),
    ZoomTo(TimeSpan),
}

pub trait Track {
    fn title(&self) -> &str;

    fn height(&self) -> f32;

    fn supports_collapse(&self) -> bool {
        false
    }

    fn is_collapsed(&self) -> bool {
        false
    }

    fn toggle_collapsed(&mut self) {}

    /// Called once per viewport-change tick. Returns the query to run when
    /// resident data no longer covers the viewport, `None` otherwise.
    fn on_update(&mut self, viewport: &Viewport) -> Option<FetchRequest>;

    /// Delivery of a completed fetch. Stale generations must be ignored.
    fn on_data(&mut self, generation: u64, data: TrackData);

    /// A fetch failed. Resident data stays on screen; the track should
    /// clear its in-flight state so a later update can retry.
    fn on_fetch_error(&mut self, _generation: u64) {}

    /// Paint into a frame whose origin is this track's top-left corner.
    fn render(&self, frame: &mut canvas::Frame, scale: &TimeScale);

    fn on_mouse_move(&mut self, _position: Point, _scale: &TimeScale) {}

    fn on_mouse_out(&mut self) {}

    fn on_mouse_click(&mut self, _position: Point, _scale: &TimeScale) -> Option<TrackAction> {
        None
    }

    fn on_double_click(&mut self, _position: Point, _scale: &TimeScale) -> Option<TrackAction> {
        None
    }

    /// New counter defaults from the settings page. Non-counter tracks
    /// ignore this.
    fn apply_counter_defaults(&mut self, _overrides: &CounterOptionOverrides) {}

    /// Resource release. Any fetch still in flight must be tolerated after
    /// this returns.
    fn on_destroy(&mut self) {}
}
