//! Per-tab state: the loaded trace, its tracks and the view over them.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::counter::{CounterOptionOverrides, RangeSharer};
use crate::data::{ProfileData, TrackDescriptor};
use crate::engine::OverviewData;
use crate::time::TimeSpan;
use crate::timeline::counter::CounterTrack;
use crate::timeline::slices::SliceTrack;
use crate::timeline::Viewport;
use crate::track::{SliceDetails, Track};

pub struct FileTab {
    pub id: u64,
    pub path: PathBuf,
    pub load_state: FileLoadState,
}

pub enum FileLoadState {
    Loading,
    Ready(Box<FileView>),
    Error(String),
}

impl FileTab {
    pub fn view(&self) -> Option<&FileView> {
        match &self.load_state {
            FileLoadState::Ready(view) => Some(view.as_ref()),
            _ => None,
        }
    }

    pub fn view_mut(&mut self) -> Option<&mut FileView> {
        match &mut self.load_state {
            FileLoadState::Ready(view) => Some(view.as_mut()),
            _ => None,
        }
    }
}

/// Everything a ready tab renders: the engine-backed profile, the track
/// set and the shared view state driving the fetch pipeline.
pub struct FileView {
    pub profile: ProfileData,
    pub tracks: Vec<Box<dyn Track>>,
    pub sharer: Arc<Mutex<RangeSharer>>,
    pub visible: TimeSpan,
    pub viewport_width: f32,
    pub view_type: crate::ViewType,
    pub selected_slice: Option<SliceDetails>,
    pub overview: Option<OverviewData>,
    pub error: Option<String>,
}

impl FileView {
    pub fn new(profile: ProfileData, counter_defaults: &CounterOptionOverrides) -> FileView {
        let sharer = Arc::new(Mutex::new(RangeSharer::new()));

        let tracks: Vec<Box<dyn Track>> = profile
            .descriptors
            .iter()
            .map(|descriptor| -> Box<dyn Track> {
                match descriptor {
                    TrackDescriptor::Slices {
                        id,
                        title,
                        max_depth,
                    } => Box::new(SliceTrack::new(title.clone(), *id, *max_depth)),
                    TrackDescriptor::Counter { id, title, unit } => {
                        let overrides = CounterOptionOverrides {
                            unit: Some(unit.clone()),
                            ..CounterOptionOverrides::default()
                        };
                        Box::new(CounterTrack::new(
                            title.clone(),
                            *id,
                            overrides,
                            counter_defaults,
                            sharer.clone(),
                        ))
                    }
                }
            })
            .collect();

        let visible = profile.trace_span;
        FileView {
            profile,
            tracks,
            sharer,
            visible,
            viewport_width: 1200.0,
            view_type: crate::ViewType::default(),
            selected_slice: None,
            overview: None,
            error: None,
        }
    }

    pub fn viewport(&self) -> Viewport {
        Viewport {
            visible: self.visible,
            width_px: self.viewport_width,
        }
    }

    pub fn destroy_tracks(&mut self) {
        for track in &mut self.tracks {
            track.on_destroy();
        }
    }
}
